//! Root configuration type.

use std::collections::HashSet;
use std::net::SocketAddr;

use bastion_router::PathTemplate;
use bastion_telemetry::{LogConfig, MetricsConfig};
use serde::{Deserialize, Serialize};

use crate::{
    ConfigError, CredentialSettings, DiscoverySettings, GatewaySettings, ServiceSettings,
    TelemetrySettings,
};

/// Complete Bastion configuration.
///
/// A gateway reads `gateway`, `discovery` and `credentials`; a service
/// publishing rules reads `service`. Both read `telemetry`.
///
/// ```
/// use bastion_config::BastionConfig;
///
/// let config = BastionConfig::default();
/// assert!(config.validate().is_ok());
/// assert!(!config.service.expose_metadata);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct BastionConfig {
    /// Gateway section.
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Service section.
    #[serde(default)]
    pub service: ServiceSettings,

    /// Static discovery section.
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Credential section.
    #[serde(default)]
    pub credentials: CredentialSettings,

    /// Telemetry section.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl BastionConfig {
    /// Pretty logs at debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            telemetry: TelemetrySettings {
                logging: LogConfig::development(),
                metrics: MetricsConfig::default(),
            },
            ..Self::default()
        }
    }

    /// JSON logs and metrics enabled.
    #[must_use]
    pub fn production() -> Self {
        Self {
            telemetry: TelemetrySettings {
                logging: LogConfig::production(),
                metrics: MetricsConfig {
                    enabled: true,
                    ..MetricsConfig::default()
                },
            },
            ..Self::default()
        }
    }

    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let gateway = &self.gateway;

        parse_addr("gateway.listen_addr", &gateway.listen_addr)?;
        if self.telemetry.metrics.enabled {
            parse_addr("telemetry.metrics.addr", &self.telemetry.metrics.addr)?;
        }

        if gateway.refresh_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "gateway.refresh_interval_ms",
                "must be greater than zero",
            ));
        }

        if !gateway.service_url_template.contains("{service}") {
            return Err(ConfigError::invalid_value(
                "gateway.service_url_template",
                "must contain the {service} placeholder",
            ));
        }

        for (field, path) in [
            ("gateway.rules_path", &gateway.rules_path),
            ("gateway.admin_reload_path", &gateway.admin_reload_path),
            ("gateway.authorize_path", &gateway.authorize_path),
            ("service.rules_path", &self.service.rules_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::invalid_value(field, "must start with '/'"));
            }
        }

        for template in &gateway.exempt_paths {
            PathTemplate::parse(template).map_err(|e| {
                ConfigError::invalid_value("gateway.exempt_paths", format!("{template}: {e}"))
            })?;
        }

        let mut seen = HashSet::new();
        for service in &self.discovery.services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "discovery.services",
                    "service name must not be empty",
                ));
            }
            if !seen.insert(service.name.to_ascii_lowercase()) {
                return Err(ConfigError::invalid_value(
                    "discovery.services",
                    format!("duplicate service '{}'", service.name),
                ));
            }
        }

        if self.service.expose_metadata && self.service.name.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "service.name",
                "required when expose_metadata is enabled",
            ));
        }

        Ok(())
    }
}

fn parse_addr(field: &str, addr: &str) -> Result<SocketAddr, ConfigError> {
    addr.parse()
        .map_err(|_| ConfigError::invalid_value(field, format!("invalid socket address: {addr}")))
}
