//! # Bastion Gateway
//!
//! Pulls authorization rules from every live service and decides requests
//! against them.
//!
//! - [`RuleDistributionLoader`] lists services through a [`Discovery`],
//!   fetches each one's rules through a [`RuleSource`] and keeps them in a
//!   [`RuleCache`]. It refreshes on a schedule, on debounced topology
//!   events and on demand. A failed fetch leaves the previous entry in place.
//! - [`AuthorizationEngine`] answers "may this caller do this?" from the
//!   cache.
//! - [`Gateway`] puts both behind a small HTTP surface: a forward-auth check
//!   and an admin reload.
//!
//! ```
//! use bastion_core::{Caller, EndpointRule, ServiceRuleSet};
//! use bastion_gateway::{AuthorizationEngine, RuleCache};
//! use http::Method;
//!
//! let cache = RuleCache::new();
//! cache.replace(
//!     "orders",
//!     ServiceRuleSet::new(
//!         "orders",
//!         "",
//!         vec![EndpointRule::secured("", "/orders/{id}", ["GET"], ["ADMIN"])],
//!     ),
//! );
//!
//! let engine = AuthorizationEngine::new(cache);
//! assert!(!engine.is_allowed(&Method::GET, "/orders/42", &Caller::authenticated(["USER"])));
//! assert!(engine.is_allowed(&Method::GET, "/orders/42", &Caller::authenticated(["ROLE_ADMIN"])));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod admin;
mod cache;
mod debounce;
mod discovery;
mod engine;
mod error;
mod loader;
pub mod server;
mod source;

pub use admin::{ReloadResponse, RELOAD_MESSAGE};
pub use cache::{CompiledRuleSet, RuleCache};
pub use debounce::Debouncer;
pub use discovery::{Discovery, StaticDiscovery, TopologyEvent};
pub use engine::{AuthorizationEngine, Decision, DecisionReason};
pub use error::{FetchFailure, GatewayError, GatewayResult};
pub use loader::{
    LoaderConfig, RefreshSummary, RefreshTrigger, RuleDistributionLoader, DEBOUNCE_WINDOW,
    FANOUT_LIMIT, FETCH_TIMEOUT,
};
pub use server::{resolver_for, Gateway};
pub use source::{HttpRuleSource, RuleSource};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
