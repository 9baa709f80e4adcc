//! # Bastion
//!
//! **Per-endpoint authorization rules, declared by each service and enforced
//! at the gateway.**
//!
//! - Each service declares which roles may call each of its routes. At
//!   startup a [`scanner::RuleScanner`] turns those declarations into a rule
//!   set, and a [`scanner::RuleExportEndpoint`] serves it.
//! - The gateway's [`gateway::RuleDistributionLoader`] pulls every live
//!   service's rule set into a cache, refreshing on a schedule, on topology
//!   changes and on demand.
//! - The [`gateway::AuthorizationEngine`] decides each request against the
//!   cache.
//!
//! ```text
//! service: routes ─► RuleScanner ─► RuleExportEndpoint (GET /security/rules)
//!                                            │
//! gateway: Discovery ─► RuleDistributionLoader ─► RuleCache ─► AuthorizationEngine
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bastion::prelude::*;
//!
//! // In a service
//! let routes = RouteTable::new("/api")
//!     .get("/orders/{id}", SecurityDeclaration::secured(["ADMIN"]))
//!     .post("/orders", SecurityDeclaration::Public);
//! let published = PublishedRules::new();
//! RuleScanner::new("orders", "/api").scan_and_publish(routes.into_routes(), &published)?;
//! RuleExportEndpoint::new("/security/rules", published)
//!     .bind_and_serve("0.0.0.0:8081".parse()?, shutdown)
//!     .await?;
//!
//! // In the gateway
//! let gateway = Arc::new(Gateway::from_config(&ConfigLoader::new().load()?)?);
//! gateway.start()?;
//! gateway.serve(listener, shutdown).await?;
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use bastion_core as core;

// Re-export path matching
pub use bastion_router as router;

// Re-export configuration
pub use bastion_config as config;

// Re-export observability
pub use bastion_telemetry as telemetry;

// Re-export the service side
pub use bastion_scanner as scanner;

// Re-export the gateway side
pub use bastion_gateway as gateway;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use bastion::prelude::*;
/// ```
pub mod prelude {
    pub use bastion_core::{Caller, EndpointRule, RequestContext, ServiceRuleSet};

    pub use bastion_config::{BastionConfig, ConfigLoader};

    pub use bastion_scanner::{
        PublishedRules, RouteTable, RuleExportEndpoint, RuleScanner, SecurityDeclaration,
    };

    pub use bastion_gateway::{
        AuthorizationEngine, Decision, Discovery, Gateway, HttpRuleSource, LoaderConfig,
        RuleCache, RuleDistributionLoader, RuleSource, StaticDiscovery,
    };
}
