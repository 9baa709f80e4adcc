//! Request-scoped context.
//!
//! The [`RequestContext`] travels with a request in its `http::Extensions`
//! and is dropped with it, so the caller identity is never visible to any
//! other request.

use std::time::{Duration, Instant};

use http::{Extensions, Request};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{ActorIdentity, Caller};

/// A unique identifier for each request, using UUID v7.
///
/// ```
/// use bastion_core::RequestId;
///
/// let a = RequestId::new();
/// let b = RequestId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new time-ordered request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Per-request state: id, resolved identity and timing.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    identity: Option<ActorIdentity>,
    started_at: Instant,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Creates an anonymous context with a fresh request id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            identity: None,
            started_at: Instant::now(),
        }
    }

    /// Returns a new context with the given identity.
    #[must_use]
    pub fn with_identity(mut self, identity: ActorIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Returns the request id.
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the identity, if the caller authenticated.
    pub fn identity(&self) -> Option<&ActorIdentity> {
        self.identity.as_ref()
    }

    /// Reduces the identity to what the decision engine needs.
    pub fn caller(&self, role_prefix: &str) -> Caller {
        Caller::from_identity(self.identity.as_ref(), role_prefix)
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores the context in request extensions, replacing any previous one.
    pub fn attach(self, extensions: &mut Extensions) {
        extensions.insert(self);
    }

    /// Reads the context attached to a request.
    pub fn of<B>(request: &Request<B>) -> Option<&Self> {
        request.extensions().get::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_display_is_uuid() {
        let id = RequestId::new();
        assert_eq!(id.to_string().len(), 36);
        assert_eq!(id.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn test_context_attach_and_read() {
        let mut request = Request::new(());
        assert!(RequestContext::of(&request).is_none());

        let ctx = RequestContext::new().with_identity(ActorIdentity::new("u-9").with_roles(["USER"]));
        let id = ctx.request_id();
        ctx.attach(request.extensions_mut());

        let ctx = RequestContext::of(&request).unwrap();
        assert_eq!(ctx.request_id(), id);
        assert_eq!(ctx.identity().map(|i| i.subject_id.as_str()), Some("u-9"));
        assert!(ctx.caller("ROLE_").has_any_role(["USER"]));
    }

    #[test]
    fn test_contexts_are_isolated() {
        let mut a = Request::new(());
        let b = Request::new(());
        RequestContext::new()
            .with_identity(ActorIdentity::new("only-a"))
            .attach(a.extensions_mut());

        assert!(RequestContext::of(&a).is_some());
        assert!(RequestContext::of(&b).is_none());
    }

    #[test]
    fn test_anonymous_context() {
        let ctx = RequestContext::new();
        assert!(ctx.identity().is_none());
        assert!(!ctx.caller("ROLE_").is_authenticated());
    }
}
