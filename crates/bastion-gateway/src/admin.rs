//! Manual reload trigger.

use serde::{Deserialize, Serialize};

use crate::cache::RuleCache;
use crate::loader::RuleDistributionLoader;

/// Message returned after a manual reload.
pub const RELOAD_MESSAGE: &str = "Security rules reloaded successfully";

/// Body of the manual reload response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    /// Human-readable outcome.
    pub message: String,
    /// Cached service names, sorted.
    pub services: Vec<String>,
    /// Rules across all cached services.
    pub total_rules: usize,
}

impl ReloadResponse {
    /// Describes the current cache contents.
    pub fn from_cache(cache: &RuleCache) -> Self {
        Self {
            message: RELOAD_MESSAGE.to_string(),
            services: cache.service_names(),
            total_rules: cache.total_rules(),
        }
    }
}

/// Runs a refresh now and reports the cache afterwards.
///
/// The response lists every cached service, including ones whose fetch
/// failed this time but which are still served from earlier rules.
pub async fn reload(loader: &RuleDistributionLoader) -> ReloadResponse {
    loader.reload().await;
    ReloadResponse::from_cache(loader.cache())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{EndpointRule, ServiceRuleSet};

    #[test]
    fn test_response_shape() {
        let cache = RuleCache::new();
        cache.replace(
            "orders",
            ServiceRuleSet::new(
                "orders",
                "",
                vec![
                    EndpointRule::public("", "/orders", ["POST"]),
                    EndpointRule::secured("", "/orders/{id}", ["GET"], ["ADMIN"]),
                ],
            ),
        );
        cache.replace("billing", ServiceRuleSet::new("billing", "", Vec::new()));

        let json = serde_json::to_value(ReloadResponse::from_cache(&cache)).unwrap();
        assert_eq!(json["message"], "Security rules reloaded successfully");
        assert_eq!(json["services"], serde_json::json!(["billing", "orders"]));
        assert_eq!(json["totalRules"], 2);
    }
}
