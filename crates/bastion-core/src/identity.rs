//! Caller identity types.
//!
//! [`ActorIdentity`] is the profile of an authenticated end user as handed
//! to Bastion by whatever verified the caller's credentials. The decision
//! engine only needs a reduced view of it, [`Caller`]: whether anyone is
//! authenticated at all and which roles they hold.

use serde::{Deserialize, Serialize};

/// Authority prefix stripped from role names before comparison.
pub const DEFAULT_ROLE_PREFIX: &str = "ROLE_";

/// Strips `prefix` from `role` if present.
///
/// ```rust
/// use bastion_core::strip_role_prefix;
///
/// assert_eq!(strip_role_prefix("ROLE_ADMIN", "ROLE_"), "ADMIN");
/// assert_eq!(strip_role_prefix("ADMIN", "ROLE_"), "ADMIN");
/// ```
pub fn strip_role_prefix<'a>(role: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return role;
    }
    role.strip_prefix(prefix).unwrap_or(role)
}

/// Profile of an authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorIdentity {
    /// Stable subject identifier.
    pub subject_id: String,
    /// Email address.
    pub email: Option<String>,
    /// Login name.
    pub username: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// The role shown as the user's main role.
    pub primary_role: Option<String>,
    /// Every role the user holds.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl ActorIdentity {
    /// Creates an identity with only a subject id.
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            ..Self::default()
        }
    }

    /// Sets the email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets first and last name.
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Sets the roles. The first one becomes the primary role unless one
    /// was set already.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        if self.primary_role.is_none() {
            self.primary_role = self.roles.first().cloned();
        }
        self
    }

    /// Returns an identifier suitable for logs. Never contains secrets.
    pub fn log_id(&self) -> String {
        format!("user:{}", self.subject_id)
    }
}

/// What the decision engine knows about a caller.
///
/// Roles are stored with the authority prefix already stripped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Caller {
    authenticated: bool,
    roles: Vec<String>,
}

impl Caller {
    /// An unauthenticated caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated caller with the given roles, stripping
    /// [`DEFAULT_ROLE_PREFIX`].
    pub fn authenticated<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::authenticated_with_prefix(roles, DEFAULT_ROLE_PREFIX)
    }

    /// An authenticated caller, stripping `prefix` from each role.
    pub fn authenticated_with_prefix<I, S>(roles: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            authenticated: true,
            roles: roles
                .into_iter()
                .map(|r| strip_role_prefix(r.as_ref(), prefix).to_string())
                .collect(),
        }
    }

    /// Builds a caller from an optional identity.
    pub fn from_identity(identity: Option<&ActorIdentity>, prefix: &str) -> Self {
        match identity {
            Some(id) => Self::authenticated_with_prefix(&id.roles, prefix),
            None => Self::anonymous(),
        }
    }

    /// Whether the caller is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Normalized roles.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Whether the caller holds at least one of `required`.
    ///
    /// `required` must already be normalized.
    pub fn has_any_role<'r, I>(&self, required: I) -> bool
    where
        I: IntoIterator<Item = &'r str>,
    {
        required
            .into_iter()
            .any(|wanted| self.roles.iter().any(|held| held == wanted))
    }
}
