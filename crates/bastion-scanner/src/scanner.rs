//! Turns a service's declared routes into its published rule set.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use bastion_config::ServiceSettings;
use bastion_core::{join_path, parse_method, EndpointRule, ServiceRuleSet};
use bastion_router::PathTemplate;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::declaration::{RouteDescriptor, SecurityDeclaration};
use crate::error::{ScanError, ScanResult};

/// Counts of what happened to each route during a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Routes turned into rules.
    pub included: usize,
    /// Routes without a security declaration.
    pub undeclared: usize,
    /// Routes left with no usable HTTP method.
    pub unresolved_methods: usize,
    /// Routes with an empty role set or an unparseable path.
    pub invalid: usize,
    /// Routes belonging to the export endpoint itself.
    pub export_routes: usize,
}

impl ScanReport {
    /// Total routes examined.
    pub fn total(&self) -> usize {
        self.included + self.undeclared + self.unresolved_methods + self.invalid + self.export_routes
    }
}

/// Extracts endpoint rules from route descriptors.
///
/// Scanning is best effort per route: a malformed route is skipped and
/// counted, never fatal.
#[derive(Debug, Clone)]
pub struct RuleScanner {
    service_name: String,
    base_path: String,
    export_path: Option<String>,
}

impl RuleScanner {
    /// Creates a scanner for `service_name`.
    pub fn new(service_name: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            base_path: base_path.into(),
            export_path: None,
        }
    }

    /// Builds a scanner from service settings.
    ///
    /// The export path is excluded only when the export endpoint is enabled.
    pub fn from_settings(settings: &ServiceSettings) -> Self {
        let scanner = Self::new(&settings.name, &settings.base_path);
        if settings.expose_metadata {
            scanner.excluding_export_path(&settings.rules_path)
        } else {
            scanner
        }
    }

    /// Excludes routes served on the rule export path.
    pub fn excluding_export_path(mut self, path: impl Into<String>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    /// Service name the rule set is published under.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Scans `routes` in order.
    pub fn scan<I>(&self, routes: I) -> (ServiceRuleSet, ScanReport)
    where
        I: IntoIterator<Item = RouteDescriptor>,
    {
        let export = self
            .export_path
            .as_deref()
            .and_then(|p| PathTemplate::parse(p).ok())
            .map(|t| t.to_string());

        let mut report = ScanReport::default();
        let mut endpoints = Vec::new();

        for route in routes {
            let full_path = join_path(&route.base_path, &route.path);

            let Some(security) = route.security else {
                debug!(handler = %route.handler, path = %full_path, "route has no security declaration");
                report.undeclared += 1;
                continue;
            };

            let template = match PathTemplate::parse(&full_path) {
                Ok(template) => template,
                Err(e) if !security.is_public() => {
                    // The gateway matches it widened; dropping it would open the path.
                    warn!(handler = %route.handler, path = %full_path, error = %e, "secured route path is not a supported template");
                    PathTemplate::parse_relaxed(&full_path)
                }
                Err(e) => {
                    warn!(handler = %route.handler, path = %full_path, error = %e, "skipping route with invalid path");
                    report.invalid += 1;
                    continue;
                }
            };

            if export.as_deref() == Some(template.to_string().as_str()) {
                debug!(handler = %route.handler, "skipping rule export route");
                report.export_routes += 1;
                continue;
            }

            let methods = resolve_methods(&route.methods);
            if methods.is_empty() {
                debug!(handler = %route.handler, path = %full_path, "route resolves to no HTTP method");
                report.unresolved_methods += 1;
                continue;
            }

            let rule = match security {
                SecurityDeclaration::Public => EndpointRule::public(route.base_path, route.path, methods),
                SecurityDeclaration::Secured { roles } if roles.is_empty() => {
                    warn!(handler = %route.handler, path = %full_path, "skipping secured route with no roles");
                    report.invalid += 1;
                    continue;
                }
                SecurityDeclaration::Secured { roles } => {
                    EndpointRule::secured(route.base_path, route.path, methods, roles)
                }
            };

            endpoints.push(rule);
            report.included += 1;
        }

        info!(
            service = %self.service_name,
            included = report.included,
            undeclared = report.undeclared,
            unresolved_methods = report.unresolved_methods,
            invalid = report.invalid,
            "route scan complete"
        );

        (
            ServiceRuleSet::new(&self.service_name, &self.base_path, endpoints),
            report,
        )
    }

    /// Scans `routes` and publishes the result into `slot`.
    pub fn scan_and_publish<I>(&self, routes: I, slot: &PublishedRules) -> ScanResult<ScanReport>
    where
        I: IntoIterator<Item = RouteDescriptor>,
    {
        let (rules, report) = self.scan(routes);
        slot.publish(rules)?;
        Ok(report)
    }
}

/// Canonical upper-case method names, unparseable tokens dropped.
fn resolve_methods(tokens: &[String]) -> BTreeSet<String> {
    tokens
        .iter()
        .filter_map(|token| match parse_method(token) {
            Ok(method) => Some(method.as_str().to_string()),
            Err(e) => {
                debug!(token = %token, error = %e, "dropping method token");
                None
            }
        })
        .collect()
}

#[derive(Debug)]
struct Published {
    rules: ServiceRuleSet,
    body: Bytes,
}

/// Write-once slot holding the service's rule set.
///
/// Cloning shares the slot, so the scanner and the export endpoint can each
/// hold a handle.
#[derive(Debug, Clone, Default)]
pub struct PublishedRules {
    inner: Arc<OnceLock<Published>>,
}

impl PublishedRules {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `rules`. Fails if the slot is already filled.
    pub fn publish(&self, rules: ServiceRuleSet) -> ScanResult<()> {
        if let Some(existing) = self.inner.get() {
            return Err(ScanError::AlreadyPublished {
                service: existing.rules.service_name.clone(),
            });
        }
        let body = Bytes::from(rules.to_json()?);
        let service = rules.service_name.clone();
        self.inner
            .set(Published { rules, body })
            .map_err(|_| ScanError::AlreadyPublished { service })
    }

    /// The published rule set, if any.
    pub fn get(&self) -> Option<&ServiceRuleSet> {
        self.inner.get().map(|p| &p.rules)
    }

    /// The published rule set encoded as JSON.
    pub fn body(&self) -> Option<Bytes> {
        self.inner.get().map(|p| p.body.clone())
    }

    /// Whether a rule set was published.
    pub fn is_published(&self) -> bool {
        self.inner.get().is_some()
    }
}
