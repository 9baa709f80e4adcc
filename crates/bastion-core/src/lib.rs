//! # Bastion Core
//!
//! Shared types for distributing and enforcing per-endpoint authorization
//! rules:
//!
//! - [`EndpointRule`] and [`ServiceRuleSet`] - the rule model and its JSON
//!   wire format
//! - [`ActorIdentity`] and [`Caller`] - who is calling, and the reduced view
//!   the decision engine uses
//! - [`RequestContext`] - request-scoped identity carried in extensions
//! - [`CredentialResolver`] - pluggable extraction of identity from headers

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
pub mod credentials;
mod error;
mod identity;
mod model;

pub use context::{RequestContext, RequestId};
pub use credentials::{AnonymousResolver, CredentialResolver, TrustedHeaderResolver};
pub use error::{CoreError, CoreResult};
pub use identity::{strip_role_prefix, ActorIdentity, Caller, DEFAULT_ROLE_PREFIX};
pub use model::{join_path, parse_method, EndpointRule, ServiceRuleSet};
