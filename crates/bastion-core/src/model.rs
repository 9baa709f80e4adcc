//! Endpoint rule model and its wire format.
//!
//! A service describes each of its secured or public endpoints as an
//! [`EndpointRule`] and publishes them together as a [`ServiceRuleSet`].
//! The JSON form uses camelCase keys:
//!
//! ```json
//! {
//!   "serviceName": "orders",
//!   "basePath": "",
//!   "endpoints": [
//!     { "basePath": "", "path": "/orders/{id}", "methods": ["GET"],
//!       "roles": ["ADMIN"], "isPublic": false }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;

use bastion_router::PathTemplate;
use http::Method;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Joins a base path and a relative path with exactly one `/` between them.
///
/// An empty `path` yields `base` unchanged.
///
/// ```rust
/// use bastion_core::join_path;
///
/// assert_eq!(join_path("/api", "orders"), "/api/orders");
/// assert_eq!(join_path("/api/", "/orders"), "/api/orders");
/// assert_eq!(join_path("/api", ""), "/api");
/// assert_eq!(join_path("", "orders"), "/orders");
/// ```
pub fn join_path(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    let base = base.strip_suffix('/').unwrap_or(base);
    let path = path.strip_prefix('/').unwrap_or(path);
    let mut full = String::with_capacity(base.len() + path.len() + 1);
    full.push_str(base);
    full.push('/');
    full.push_str(path);
    full
}

/// Access requirement for one endpoint.
///
/// A public rule carries no roles. A secured rule grants access to any
/// authenticated caller holding at least one of `roles`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRule {
    /// Prefix shared by the service's routes.
    #[serde(default)]
    pub base_path: String,

    /// Route path relative to `base_path`.
    #[serde(default)]
    pub path: String,

    /// HTTP method tokens the rule applies to.
    #[serde(default)]
    pub methods: BTreeSet<String>,

    /// Roles of which a caller needs at least one.
    #[serde(default)]
    pub roles: BTreeSet<String>,

    /// Whether the endpoint is open to anonymous callers.
    #[serde(default)]
    pub is_public: bool,
}

impl EndpointRule {
    /// Creates a public rule.
    pub fn public<I, M>(base_path: impl Into<String>, path: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            base_path: base_path.into(),
            path: path.into(),
            methods: methods.into_iter().map(Into::into).collect(),
            roles: BTreeSet::new(),
            is_public: true,
        }
    }

    /// Creates a rule requiring one of `roles`.
    pub fn secured<I, M, R, S>(
        base_path: impl Into<String>,
        path: impl Into<String>,
        methods: I,
        roles: R,
    ) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base_path: base_path.into(),
            path: path.into(),
            methods: methods.into_iter().map(Into::into).collect(),
            roles: roles.into_iter().map(Into::into).collect(),
            is_public: false,
        }
    }

    /// Returns `base_path` joined with `path`.
    pub fn full_path(&self) -> String {
        join_path(&self.base_path, &self.path)
    }

    /// Parses the method tokens into HTTP methods.
    ///
    /// Tokens are matched case-insensitively.
    pub fn http_methods(&self) -> CoreResult<Vec<Method>> {
        self.methods.iter().map(String::as_str).map(parse_method).collect()
    }

    /// Parses the full path into a template.
    pub fn template(&self) -> CoreResult<PathTemplate> {
        let full = self.full_path();
        PathTemplate::parse(&full).map_err(|e| CoreError::invalid_template(full, e))
    }

    /// The template requests are matched against.
    ///
    /// A secured rule whose full path [`template`](Self::template) rejects
    /// (a constrained variable such as `{id:\d+}`, say) is matched with
    /// [`PathTemplate::parse_relaxed`], so its roles guard every path it could
    /// have meant. A public rule with an invalid path is an error.
    pub fn match_template(&self) -> CoreResult<PathTemplate> {
        match self.template() {
            Err(_) if !self.is_public => Ok(PathTemplate::parse_relaxed(&self.full_path())),
            parsed => parsed,
        }
    }

    /// Checks the model invariants.
    ///
    /// - at least one method, all parseable
    /// - public rules carry no roles, secured rules carry at least one
    /// - the full path of a public rule is a valid template
    pub fn validate(&self) -> CoreResult<()> {
        if self.methods.is_empty() {
            return Err(CoreError::invalid_rule(
                self.full_path(),
                "methods must not be empty",
            ));
        }
        self.http_methods()?;
        if self.is_public && !self.roles.is_empty() {
            return Err(CoreError::invalid_rule(
                self.full_path(),
                "public rules must not carry roles",
            ));
        }
        if !self.is_public && self.roles.is_empty() {
            return Err(CoreError::invalid_rule(
                self.full_path(),
                "secured rules need at least one role",
            ));
        }
        self.match_template().map(|_| ())
    }
}

/// Parses an HTTP method token, case-insensitively.
pub fn parse_method(token: &str) -> CoreResult<Method> {
    let upper = token.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(CoreError::InvalidMethod {
            token: token.to_string(),
        });
    }
    Method::from_bytes(upper.as_bytes()).map_err(|_| CoreError::InvalidMethod {
        token: token.to_string(),
    })
}

/// Every endpoint rule a service publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRuleSet {
    /// Name under which the service is registered.
    pub service_name: String,

    /// Service-wide path prefix.
    #[serde(default)]
    pub base_path: String,

    /// Rules in scan order.
    pub endpoints: Vec<EndpointRule>,
}

impl ServiceRuleSet {
    /// Creates a rule set.
    pub fn new(
        service_name: impl Into<String>,
        base_path: impl Into<String>,
        endpoints: Vec<EndpointRule>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            base_path: base_path.into(),
            endpoints,
        }
    }

    /// Returns the number of endpoint rules.
    pub fn total_rules(&self) -> usize {
        self.endpoints.len()
    }

    /// Encodes the rule set as JSON.
    pub fn to_json(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a rule set from JSON.
    ///
    /// A document without an `endpoints` array is rejected.
    pub fn from_json(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
