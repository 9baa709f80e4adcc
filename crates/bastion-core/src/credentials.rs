//! Credential resolution.
//!
//! Bastion never verifies tokens itself. A [`CredentialResolver`] turns
//! whatever a trusted upstream left on the request into an
//! [`ActorIdentity`], or `None` for an anonymous caller.

use http::{HeaderMap, HeaderValue};

use crate::error::{CoreError, CoreResult};
use crate::identity::ActorIdentity;

/// Header names read by [`TrustedHeaderResolver`].
pub mod headers {
    /// Subject id. Its presence marks the caller as authenticated.
    pub const SUBJECT: &str = "x-auth-subject";
    /// Email address.
    pub const EMAIL: &str = "x-auth-email";
    /// Login name.
    pub const USERNAME: &str = "x-auth-username";
    /// Given name.
    pub const FIRST_NAME: &str = "x-auth-first-name";
    /// Family name.
    pub const LAST_NAME: &str = "x-auth-last-name";
    /// Comma separated roles; the first is the primary role.
    pub const ROLES: &str = "x-auth-roles";
}

/// Resolves the caller identity from request headers.
pub trait CredentialResolver: Send + Sync {
    /// Returns the identity, `None` when the request is anonymous.
    ///
    /// Malformed credential material is an error; callers should treat it
    /// as anonymous.
    fn resolve(&self, headers: &HeaderMap) -> CoreResult<Option<ActorIdentity>>;
}

/// Treats every request as anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousResolver;

impl CredentialResolver for AnonymousResolver {
    fn resolve(&self, _headers: &HeaderMap) -> CoreResult<Option<ActorIdentity>> {
        Ok(None)
    }
}

/// Reads identity headers set by an authenticating proxy in front of Bastion.
///
/// Only deploy this behind a proxy that strips these headers from
/// client requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedHeaderResolver;

impl TrustedHeaderResolver {
    fn text<'h>(headers: &'h HeaderMap, name: &str) -> CoreResult<Option<&'h str>> {
        headers
            .get(name)
            .map(|v: &HeaderValue| {
                v.to_str()
                    .map(str::trim)
                    .map_err(|_| CoreError::invalid_credential(name, "not visible ASCII"))
            })
            .transpose()
            .map(|v| v.filter(|s| !s.is_empty()))
    }
}

impl CredentialResolver for TrustedHeaderResolver {
    fn resolve(&self, headers: &HeaderMap) -> CoreResult<Option<ActorIdentity>> {
        let Some(subject) = Self::text(headers, headers::SUBJECT)? else {
            return Ok(None);
        };

        let roles: Vec<&str> = Self::text(headers, headers::ROLES)?
            .map(|raw| raw.split(',').map(str::trim).filter(|r| !r.is_empty()).collect())
            .unwrap_or_default();

        let mut identity = ActorIdentity::new(subject).with_roles(roles);
        identity.email = Self::text(headers, headers::EMAIL)?.map(str::to_string);
        identity.username = Self::text(headers, headers::USERNAME)?.map(str::to_string);
        identity.first_name = Self::text(headers, headers::FIRST_NAME)?.map(str::to_string);
        identity.last_name = Self::text(headers, headers::LAST_NAME)?.map(str::to_string);
        Ok(Some(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_anonymous_resolver() {
        let h = headers(&[(headers::SUBJECT, "u-1")]);
        assert!(AnonymousResolver.resolve(&h).unwrap().is_none());
    }

    #[test]
    fn test_no_subject_is_anonymous() {
        let h = headers(&[(headers::ROLES, "ADMIN")]);
        assert!(TrustedHeaderResolver.resolve(&h).unwrap().is_none());

        let h = headers(&[(headers::SUBJECT, "  ")]);
        assert!(TrustedHeaderResolver.resolve(&h).unwrap().is_none());
    }

    #[test]
    fn test_full_identity() {
        let h = headers(&[
            (headers::SUBJECT, "u-1"),
            (headers::EMAIL, "alice@example.com"),
            (headers::USERNAME, "alice"),
            (headers::FIRST_NAME, "Alice"),
            (headers::LAST_NAME, "Martin"),
            (headers::ROLES, "ROLE_ADMIN, USER,,"),
        ]);
        let id = TrustedHeaderResolver.resolve(&h).unwrap().unwrap();
        assert_eq!(id.subject_id, "u-1");
        assert_eq!(id.email.as_deref(), Some("alice@example.com"));
        assert_eq!(id.username.as_deref(), Some("alice"));
        assert_eq!(id.first_name.as_deref(), Some("Alice"));
        assert_eq!(id.last_name.as_deref(), Some("Martin"));
        assert_eq!(id.roles, vec!["ROLE_ADMIN", "USER"]);
        assert_eq!(id.primary_role.as_deref(), Some("ROLE_ADMIN"));
    }

    #[test]
    fn test_authenticated_without_roles() {
        let h = headers(&[(headers::SUBJECT, "u-2")]);
        let id = TrustedHeaderResolver.resolve(&h).unwrap().unwrap();
        assert!(id.roles.is_empty());
        assert!(id.primary_role.is_none());
    }

    #[test]
    fn test_non_ascii_header_is_error() {
        let mut h = HeaderMap::new();
        h.insert(headers::SUBJECT, HeaderValue::from_bytes(b"u-\xff").unwrap());
        let err = TrustedHeaderResolver.resolve(&h).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCredential { .. }));
    }
}
