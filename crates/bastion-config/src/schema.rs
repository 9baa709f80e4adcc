//! Configuration schema types.
//!
//! Every field has a default, so an empty file is a valid configuration.

use bastion_telemetry::{LogConfig, MetricsConfig};
use serde::{Deserialize, Serialize};

/// Settings for the gateway that distributes and enforces rules.
///
/// ```
/// use bastion_config::GatewaySettings;
///
/// let gateway = GatewaySettings::default();
/// assert_eq!(gateway.refresh_interval_ms, 300_000);
/// assert_eq!(gateway.initial_delay_ms, 10_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GatewaySettings {
    /// Address the gateway's HTTP endpoints bind to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Delay between the end of one periodic refresh and the next.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Delay before the first periodic refresh.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Discovery names never fetched, compared case-insensitively.
    #[serde(default = "default_excluded_services")]
    pub excluded_service_names: Vec<String>,

    /// Path templates allowed for any caller before rules are consulted.
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,

    /// Authority prefix stripped from role names.
    #[serde(default = "default_role_prefix")]
    pub role_prefix: String,

    /// Path each service exposes its rule set on.
    #[serde(default = "default_rules_path")]
    pub rules_path: String,

    /// Base URL for a service, `{service}` is replaced by its name.
    #[serde(default = "default_service_url_template")]
    pub service_url_template: String,

    /// Path of the manual reload endpoint.
    #[serde(default = "default_admin_reload_path")]
    pub admin_reload_path: String,

    /// Path of the forward-auth check endpoint.
    #[serde(default = "default_authorize_path")]
    pub authorize_path: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            refresh_interval_ms: default_refresh_interval(),
            initial_delay_ms: default_initial_delay(),
            excluded_service_names: default_excluded_services(),
            exempt_paths: default_exempt_paths(),
            role_prefix: default_role_prefix(),
            rules_path: default_rules_path(),
            service_url_template: default_service_url_template(),
            admin_reload_path: default_admin_reload_path(),
            authorize_path: default_authorize_path(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_refresh_interval() -> u64 {
    300_000
}

fn default_initial_delay() -> u64 {
    10_000
}

fn default_excluded_services() -> Vec<String> {
    ["gateway", "sib-gateway-service", "sib-registry"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_exempt_paths() -> Vec<String> {
    ["/actuator/**", "/eureka/**", "/security/rules"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_role_prefix() -> String {
    "ROLE_".to_string()
}

fn default_rules_path() -> String {
    "/security/rules".to_string()
}

fn default_service_url_template() -> String {
    "http://{service}".to_string()
}

fn default_admin_reload_path() -> String {
    "/admin/security/reload".to_string()
}

fn default_authorize_path() -> String {
    "/_bastion/authorize".to_string()
}

/// Settings for a service publishing its own rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServiceSettings {
    /// Name the service registers under.
    #[serde(default)]
    pub name: String,

    /// Prefix shared by the service's routes.
    #[serde(default)]
    pub base_path: String,

    /// Whether the rule export endpoint is registered at all.
    #[serde(default)]
    pub expose_metadata: bool,

    /// Path the rule export endpoint is served on.
    #[serde(default = "default_rules_path")]
    pub rules_path: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_path: String::new(),
            expose_metadata: false,
            rules_path: default_rules_path(),
        }
    }
}

/// One statically configured service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StaticService {
    /// Discovery name.
    pub name: String,
    /// Base URL; the gateway's URL template is used when absent.
    #[serde(default)]
    pub url: Option<String>,
}

/// Discovery settings for the built-in static registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct DiscoverySettings {
    /// Services reported as live.
    #[serde(default)]
    pub services: Vec<StaticService>,
}

/// How the gateway learns who is calling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialMode {
    /// Identity headers set by an authenticating proxy.
    #[default]
    TrustedHeaders,
    /// Every caller is anonymous.
    Anonymous,
}

/// Credential settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct CredentialSettings {
    /// Resolver to use.
    #[serde(default)]
    pub mode: CredentialMode,
}

/// Telemetry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySettings {
    /// Logging.
    #[serde(default)]
    pub logging: LogConfig,
    /// Prometheus metrics.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_defaults() {
        let gateway = GatewaySettings::default();
        assert_eq!(gateway.listen_addr, "0.0.0.0:8080");
        assert_eq!(
            gateway.excluded_service_names,
            vec!["gateway", "sib-gateway-service", "sib-registry"]
        );
        assert_eq!(
            gateway.exempt_paths,
            vec!["/actuator/**", "/eureka/**", "/security/rules"]
        );
        assert_eq!(gateway.role_prefix, "ROLE_");
        assert_eq!(gateway.rules_path, "/security/rules");
    }

    #[test]
    fn test_service_defaults() {
        let service = ServiceSettings::default();
        assert!(!service.expose_metadata);
        assert_eq!(service.rules_path, "/security/rules");
    }

    #[test]
    fn test_credential_mode_kebab_case() {
        let s: CredentialSettings = toml::from_str(r#"mode = "trusted-headers""#).unwrap();
        assert_eq!(s.mode, CredentialMode::TrustedHeaders);
        let s: CredentialSettings = toml::from_str(r#"mode = "anonymous""#).unwrap();
        assert_eq!(s.mode, CredentialMode::Anonymous);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<GatewaySettings, _> = toml::from_str("refresh_intervl_ms = 5");
        assert!(result.is_err());
    }

    #[test]
    fn test_static_service_url_optional() {
        let d: DiscoverySettings = toml::from_str(
            r#"
            [[services]]
            name = "orders"

            [[services]]
            name = "billing"
            url = "http://billing.internal:8081"
            "#,
        )
        .unwrap();
        assert_eq!(d.services.len(), 2);
        assert!(d.services[0].url.is_none());
        assert_eq!(d.services[1].url.as_deref(), Some("http://billing.internal:8081"));
    }
}
