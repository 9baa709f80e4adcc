//! Where the loader fetches rule sets from.

use std::collections::HashMap;

use async_trait::async_trait;
use bastion_config::{DiscoverySettings, GatewaySettings};
use bastion_core::ServiceRuleSet;
use http::header::ACCEPT;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{FetchFailure, GatewayError, GatewayResult};

/// Fetches the rule set a service publishes.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Fetches the current rule set of `service`.
    async fn fetch(&self, service: &str) -> GatewayResult<ServiceRuleSet>;
}

/// Fetches rule sets over HTTP from each service's export endpoint.
///
/// A service's base URL comes from an explicit override if one was given,
/// otherwise from the URL template with `{service}` replaced by its name.
#[derive(Debug, Clone)]
pub struct HttpRuleSource {
    client: Client,
    url_template: String,
    rules_path: String,
    overrides: HashMap<String, String>,
}

impl HttpRuleSource {
    /// Creates a source using `url_template` and `rules_path`.
    pub fn new(url_template: impl Into<String>, rules_path: impl Into<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| GatewayError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url_template: url_template.into(),
            rules_path: rules_path.into(),
            overrides: HashMap::new(),
        })
    }

    /// Creates a source from the gateway and discovery sections.
    ///
    /// Static services with a `url` become overrides.
    pub fn from_settings(gateway: &GatewaySettings, discovery: &DiscoverySettings) -> GatewayResult<Self> {
        let source = Self::new(&gateway.service_url_template, &gateway.rules_path)?;
        Ok(discovery
            .services
            .iter()
            .filter_map(|s| s.url.as_ref().map(|url| (&s.name, url)))
            .fold(source, |source, (name, url)| source.with_override(name, url)))
    }

    /// Uses `base_url` for `service` instead of the template.
    ///
    /// Service names are matched case-insensitively.
    pub fn with_override(mut self, service: impl AsRef<str>, base_url: impl Into<String>) -> Self {
        self.overrides
            .insert(service.as_ref().to_ascii_lowercase(), base_url.into());
        self
    }

    /// The URL the rules of `service` are fetched from.
    pub fn url_for(&self, service: &str) -> String {
        let base = self
            .overrides
            .get(&service.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| self.url_template.replace("{service}", service));
        format!("{}{}", base.trim_end_matches('/'), self.rules_path)
    }
}

#[async_trait]
impl RuleSource for HttpRuleSource {
    #[instrument(skip(self), fields(url = tracing::field::Empty))]
    async fn fetch(&self, service: &str) -> GatewayResult<ServiceRuleSet> {
        let url = self.url_for(service);
        tracing::Span::current().record("url", url.as_str());

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    FetchFailure::Timeout
                } else {
                    FetchFailure::Transport
                };
                GatewayError::fetch(service, kind, e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::fetch(
                service,
                FetchFailure::Status(status.as_u16()),
                format!("GET {url} returned {status}"),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::fetch(service, FetchFailure::Transport, e))?;
        if body.is_empty() {
            return Err(GatewayError::fetch(service, FetchFailure::Malformed, "empty body"));
        }

        let rules = ServiceRuleSet::from_json(&body)
            .map_err(|e| GatewayError::fetch(service, FetchFailure::Malformed, e))?;
        debug!(rules = rules.total_rules(), "fetched rule set");
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_config::StaticService;

    #[test]
    fn test_url_from_template() {
        let source = HttpRuleSource::new("http://{service}:8080", "/security/rules").unwrap();
        assert_eq!(source.url_for("orders"), "http://orders:8080/security/rules");
    }

    #[test]
    fn test_override_wins() {
        let source = HttpRuleSource::new("http://{service}", "/security/rules")
            .unwrap()
            .with_override("Orders", "http://127.0.0.1:9000/");
        assert_eq!(source.url_for("ORDERS"), "http://127.0.0.1:9000/security/rules");
        assert_eq!(source.url_for("billing"), "http://billing/security/rules");
    }

    #[test]
    fn test_from_settings_uses_static_urls() {
        let discovery = DiscoverySettings {
            services: vec![
                StaticService {
                    name: "orders".into(),
                    url: Some("http://10.0.0.5:8081".into()),
                },
                StaticService {
                    name: "billing".into(),
                    url: None,
                },
            ],
        };
        let source = HttpRuleSource::from_settings(&GatewaySettings::default(), &discovery).unwrap();
        assert_eq!(source.url_for("orders"), "http://10.0.0.5:8081/security/rules");
        assert_eq!(source.url_for("billing"), "http://billing/security/rules");
    }
}
