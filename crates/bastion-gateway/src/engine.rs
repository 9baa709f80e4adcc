//! Request-time authorization decisions.
//!
//! The engine reads the [`RuleCache`] and never writes it. A decision is:
//!
//! 1. exempt path: allow
//! 2. no matching rule: allow iff the caller is authenticated
//! 3. public rule: allow
//! 4. secured rule: allow iff the caller is authenticated and holds one of
//!    the rule's roles
//!
//! When rules from several services match, the most specific template wins
//! and equal specificity goes to the alphabetically first service.

use std::fmt;
use std::sync::Arc;

use bastion_config::GatewaySettings;
use bastion_core::{strip_role_prefix, Caller, EndpointRule};
use bastion_router::{MethodRouter, Router, Specificity};
use bastion_telemetry::metrics::record_decision;
use http::Method;
use tracing::debug;

use crate::cache::RuleCache;
use crate::error::{GatewayError, GatewayResult};

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionReason {
    /// The path is exempt from authorization.
    ExemptPath,
    /// The matching rule is public.
    PublicRule,
    /// The caller holds one of the rule's roles.
    RoleGranted,
    /// No rule matched and the caller is authenticated.
    AuthenticatedDefault,
    /// Authentication is required and the caller has none.
    Unauthenticated,
    /// The caller holds none of the rule's roles.
    MissingRole,
}

impl DecisionReason {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExemptPath => "exempt_path",
            Self::PublicRule => "public_rule",
            Self::RoleGranted => "role_granted",
            Self::AuthenticatedDefault => "authenticated_default",
            Self::Unauthenticated => "unauthenticated",
            Self::MissingRole => "missing_role",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An allow or deny verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    allowed: bool,
    reason: DecisionReason,
    service: Option<Arc<str>>,
}

impl Decision {
    fn allow(reason: DecisionReason, service: Option<Arc<str>>) -> Self {
        Self {
            allowed: true,
            reason,
            service,
        }
    }

    fn deny(reason: DecisionReason, service: Option<Arc<str>>) -> Self {
        Self {
            allowed: false,
            reason,
            service,
        }
    }

    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Why.
    pub fn reason(&self) -> DecisionReason {
        self.reason
    }

    /// Service whose rule decided, if any.
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }
}

/// Matches requests against cached rules.
#[derive(Debug, Clone)]
pub struct AuthorizationEngine {
    cache: RuleCache,
    exempt: Arc<Router<()>>,
    role_prefix: String,
}

impl AuthorizationEngine {
    /// Creates an engine with no exempt paths and the `ROLE_` prefix.
    pub fn new(cache: RuleCache) -> Self {
        Self {
            cache,
            exempt: Arc::new(Router::new()),
            role_prefix: bastion_core::DEFAULT_ROLE_PREFIX.to_string(),
        }
    }

    /// Creates an engine using the gateway's exempt paths and role prefix.
    pub fn from_settings(cache: RuleCache, settings: &GatewaySettings) -> GatewayResult<Self> {
        Self::new(cache)
            .with_role_prefix(&settings.role_prefix)
            .with_exempt_paths(&settings.exempt_paths)
    }

    /// Allows any caller on paths matching `templates`, for every method.
    pub fn with_exempt_paths<I, S>(mut self, templates: I) -> GatewayResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exempt = Router::new();
        for template in templates {
            let template = template.as_ref();
            exempt
                .insert(template, MethodRouter::new().any(()))
                .map_err(|e| GatewayError::config(format!("invalid exempt path '{template}': {e}")))?;
        }
        self.exempt = Arc::new(exempt);
        Ok(self)
    }

    /// Sets the authority prefix stripped from rule roles.
    pub fn with_role_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.role_prefix = prefix.into();
        self
    }

    /// The role prefix in use.
    pub fn role_prefix(&self) -> &str {
        &self.role_prefix
    }

    /// The cache the engine reads.
    pub fn cache(&self) -> &RuleCache {
        &self.cache
    }

    /// Decides whether `caller` may call `method path`.
    ///
    /// `path` must not include a query string.
    pub fn decide(&self, method: &Method, path: &str, caller: &Caller) -> Decision {
        let decision = self.evaluate(method, path, caller);

        debug!(
            method = %method,
            path = %path,
            decision = if decision.allowed { "allow" } else { "deny" },
            reason = %decision.reason,
            service = decision.service().unwrap_or("-"),
            "authorization decision"
        );
        record_decision(decision.allowed, decision.reason.as_str());
        decision
    }

    /// Shorthand for `decide(..).is_allowed()`.
    pub fn is_allowed(&self, method: &Method, path: &str, caller: &Caller) -> bool {
        self.decide(method, path, caller).is_allowed()
    }

    fn evaluate(&self, method: &Method, path: &str, caller: &Caller) -> Decision {
        if self.exempt.match_route(method, path).is_some() {
            return Decision::allow(DecisionReason::ExemptPath, None);
        }

        let Some((service, rule)) = self.best_match(method, path) else {
            return if caller.is_authenticated() {
                Decision::allow(DecisionReason::AuthenticatedDefault, None)
            } else {
                Decision::deny(DecisionReason::Unauthenticated, None)
            };
        };
        let service = Some(service);

        if rule.is_public {
            return Decision::allow(DecisionReason::PublicRule, service);
        }
        if !caller.is_authenticated() {
            return Decision::deny(DecisionReason::Unauthenticated, service);
        }

        let prefix = self.role_prefix.as_str();
        if caller.has_any_role(rule.roles.iter().map(|r| strip_role_prefix(r, prefix))) {
            Decision::allow(DecisionReason::RoleGranted, service)
        } else {
            Decision::deny(DecisionReason::MissingRole, service)
        }
    }

    /// The winning service and rule across all services.
    fn best_match(&self, method: &Method, path: &str) -> Option<(Arc<str>, Arc<EndpointRule>)> {
        let mut best: Option<(Specificity, Arc<str>, Arc<EndpointRule>)> = None;

        self.cache.for_each(|entry| {
            let Some((rule, matched)) = entry.find(method, path) else {
                return;
            };
            let specificity = matched.specificity;
            let better = match &best {
                None => true,
                Some((current, holder, _)) => {
                    specificity > *current || (specificity == *current && entry.service() < holder)
                }
            };
            if better {
                best = Some((specificity, Arc::clone(entry.service()), Arc::clone(rule)));
            }
        });

        best.map(|(_, service, rule)| (service, rule))
    }
}
