//! Central cache of every service's rules.
//!
//! Each entry is replaced as a whole behind an `Arc`, so a reader holding an
//! entry never sees it change underneath.

use std::sync::Arc;

use bastion_core::{EndpointRule, ServiceRuleSet};
use bastion_router::{MethodRouter, RouteMatch, Router};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::Method;
use tracing::warn;

/// A service's rule set indexed for matching.
///
/// Rules that break the model invariants are dropped when compiling; the
/// rest are kept in scan order. A secured rule with an unsupported path is
/// kept and matched with a widened template, so it never opens its paths to
/// callers without its roles.
#[derive(Debug)]
pub struct CompiledRuleSet {
    service: Arc<str>,
    rules: ServiceRuleSet,
    router: Router<Arc<EndpointRule>>,
    fetched_at: DateTime<Utc>,
    dropped: usize,
}

impl CompiledRuleSet {
    /// Validates and indexes `rules` for the service named `service`.
    pub fn compile(service: &str, rules: ServiceRuleSet) -> Self {
        let ServiceRuleSet {
            service_name,
            base_path,
            endpoints,
        } = rules;

        let mut router = Router::new();
        let mut kept: Vec<EndpointRule> = Vec::with_capacity(endpoints.len());
        let mut dropped = 0;

        for rule in endpoints {
            let compiled = rule
                .validate()
                .and_then(|()| Ok((rule.match_template()?, rule.http_methods()?)));
            let (template, methods) = match compiled {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(service = %service, path = %rule.full_path(), error = %e, "dropping invalid rule");
                    dropped += 1;
                    continue;
                }
            };

            if let Err(e) = rule.template() {
                warn!(
                    service = %service,
                    path = %rule.full_path(),
                    matched_as = %template,
                    error = %e,
                    "secured rule path is not a supported template, matching it widened"
                );
            }

            let shared = Arc::new(rule);
            let handlers = methods.iter().fold(MethodRouter::new(), |handlers, method| {
                handlers.method(method, Arc::clone(&shared))
            });
            router.insert_template(&template, handlers);
            kept.push(shared.as_ref().clone());
        }

        Self {
            service: Arc::from(service),
            rules: ServiceRuleSet::new(service_name, base_path, kept),
            router,
            fetched_at: Utc::now(),
            dropped,
        }
    }

    /// Discovery name the entry is cached under.
    pub fn service(&self) -> &Arc<str> {
        &self.service
    }

    /// The kept rules.
    pub fn rules(&self) -> &ServiceRuleSet {
        &self.rules
    }

    /// When the rules were fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Number of rules dropped while compiling.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Number of kept rules.
    pub fn total_rules(&self) -> usize {
        self.rules.total_rules()
    }

    /// Finds the best rule of this service for a request.
    ///
    /// Among this service's templates, literal segments are preferred over
    /// variables, and variables over wildcards. When several rules share a
    /// template and method, the first in scan order applies.
    pub fn find<'a>(
        &'a self,
        method: &Method,
        path: &'a str,
    ) -> Option<(&'a Arc<EndpointRule>, RouteMatch<'a, Arc<EndpointRule>>)> {
        let matched = self.router.match_route(method, path)?;
        Some((matched.value, matched))
    }
}

/// Concurrent map of discovery name to compiled rule set.
///
/// Cloning shares the map.
#[derive(Debug, Clone, Default)]
pub struct RuleCache {
    entries: Arc<DashMap<String, Arc<CompiledRuleSet>>>,
}

impl RuleCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for `service`, returning the previous one.
    pub fn replace(&self, service: &str, rules: ServiceRuleSet) -> Option<Arc<CompiledRuleSet>> {
        let compiled = Arc::new(CompiledRuleSet::compile(service, rules));
        self.entries.insert(service.to_string(), compiled)
    }

    /// The entry for `service`.
    pub fn get(&self, service: &str) -> Option<Arc<CompiledRuleSet>> {
        self.entries.get(service).map(|e| Arc::clone(e.value()))
    }

    /// Cached service names, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Sum of kept rules over all services.
    pub fn total_rules(&self) -> usize {
        self.entries.iter().map(|e| e.value().total_rules()).sum()
    }

    /// Number of cached services.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Calls `f` with every entry.
    ///
    /// Entries are visited in no particular order.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<CompiledRuleSet>),
    {
        for entry in self.entries.iter() {
            f(entry.value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> ServiceRuleSet {
        ServiceRuleSet::new(
            "orders",
            "",
            vec![
                EndpointRule::secured("", "/orders/{id}", ["GET"], ["ADMIN"]),
                EndpointRule::public("", "/orders", ["POST"]),
            ],
        )
    }

    #[test]
    fn test_compile_and_find() {
        let compiled = CompiledRuleSet::compile("orders", orders());
        assert_eq!(compiled.total_rules(), 2);
        assert_eq!(compiled.dropped(), 0);

        let (rule, m) = compiled.find(&Method::GET, "/orders/42").unwrap();
        assert!(rule.roles.contains("ADMIN"));
        assert_eq!(m.params.get("id"), Some("42"));

        assert!(compiled.find(&Method::DELETE, "/orders/42").is_none());
        assert!(compiled.find(&Method::POST, "/orders").unwrap().0.is_public);
    }

    #[test]
    fn test_invalid_rules_dropped_individually() {
        let mut rules = orders();
        rules.endpoints.push(EndpointRule::public("", "/a", Vec::<String>::new()));
        rules
            .endpoints
            .push(EndpointRule::secured("", "/b", ["GET"], ["ADMIN"]));
        rules.endpoints.last_mut().unwrap().is_public = true;
        rules.endpoints.push(EndpointRule::public("", "/c/**/d", ["GET"]));
        rules.endpoints.push(EndpointRule::public("", "/e", ["GET"]));

        let compiled = CompiledRuleSet::compile("orders", rules);
        assert_eq!(compiled.dropped(), 3);
        assert_eq!(compiled.total_rules(), 3);
        assert!(compiled.find(&Method::GET, "/e").is_some());
        assert!(compiled.find(&Method::GET, "/b").is_none());
    }

    #[test]
    fn test_constrained_secured_rule_is_widened() {
        let rules = ServiceRuleSet::new(
            "orders",
            "/orders",
            vec![
                EndpointRule::secured("/orders", "/{id:\\d+}", ["GET"], ["ADMIN"]),
                EndpointRule::public("/orders", "/{slug:[a-z]+}", ["GET"]),
            ],
        );
        let compiled = CompiledRuleSet::compile("orders", rules);

        assert_eq!(compiled.total_rules(), 1);
        assert_eq!(compiled.dropped(), 1);
        let (rule, m) = compiled.find(&Method::GET, "/orders/42").unwrap();
        assert!(rule.roles.contains("ADMIN"));
        assert_eq!(m.params.get("id"), Some("42"));
    }

    #[test]
    fn test_first_rule_wins_for_same_template() {
        let rules = ServiceRuleSet::new(
            "svc",
            "",
            vec![
                EndpointRule::secured("", "/x", ["GET"], ["FIRST"]),
                EndpointRule::secured("", "/x/", ["GET", "POST"], ["SECOND"]),
            ],
        );
        let compiled = CompiledRuleSet::compile("svc", rules);

        assert!(compiled.find(&Method::GET, "/x").unwrap().0.roles.contains("FIRST"));
        assert!(compiled.find(&Method::POST, "/x").unwrap().0.roles.contains("SECOND"));
    }

    #[test]
    fn test_cache_replace_is_per_key() {
        let cache = RuleCache::new();
        assert!(cache.replace("orders", orders()).is_none());
        cache.replace("billing", ServiceRuleSet::new("billing", "", Vec::new()));

        let before = cache.get("orders").unwrap();
        let previous = cache.replace("orders", ServiceRuleSet::new("orders", "", Vec::new()));

        assert!(Arc::ptr_eq(&before, &previous.unwrap()));
        assert_eq!(before.total_rules(), 2);
        assert_eq!(cache.get("orders").unwrap().total_rules(), 0);
        assert_eq!(cache.service_names(), vec!["billing", "orders"]);
    }

    #[test]
    fn test_total_rules() {
        let cache = RuleCache::new();
        assert!(cache.is_empty());
        cache.replace("orders", orders());
        cache.replace("orders-copy", orders());
        assert_eq!(cache.total_rules(), 4);
        assert_eq!(cache.len(), 2);

        let mut seen = 0;
        cache.for_each(|_| seen += 1);
        assert_eq!(seen, 2);
    }
}
