//! # Bastion Scanner
//!
//! Runs inside each protected service. At startup the service hands its
//! route list to a [`RuleScanner`], which keeps the routes carrying a
//! [`SecurityDeclaration`] and publishes them once as a
//! [`ServiceRuleSet`](bastion_core::ServiceRuleSet). The optional
//! [`RuleExportEndpoint`] then serves that rule set to the gateway.
//!
//! ```
//! use bastion_scanner::{PublishedRules, RouteTable, RuleExportEndpoint, RuleScanner, SecurityDeclaration};
//!
//! let routes = RouteTable::new("")
//!     .get("/orders/{id}", SecurityDeclaration::secured(["ADMIN"]))
//!     .post("/orders", SecurityDeclaration::Public);
//!
//! let published = PublishedRules::new();
//! let report = RuleScanner::new("orders", "")
//!     .excluding_export_path("/security/rules")
//!     .scan_and_publish(routes.into_routes(), &published)
//!     .unwrap();
//! assert_eq!(report.included, 2);
//!
//! let endpoint = RuleExportEndpoint::new("/security/rules", published);
//! assert_eq!(endpoint.path(), "/security/rules");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod declaration;
mod error;
mod export;
mod scanner;

pub use declaration::{RouteDescriptor, RouteTable, SecurityDeclaration};
pub use error::{ScanError, ScanResult};
pub use export::RuleExportEndpoint;
pub use scanner::{PublishedRules, RuleScanner, ScanReport};
