//! Configuration loader with layered approach.

use std::env;
use std::fs;
use std::path::Path;

use crate::{BastionConfig, ConfigError, CredentialMode, StaticService};

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables `PREFIX__SECTION__KEY`
///
/// # Example
///
/// ```no_run
/// use bastion_config::ConfigLoader;
///
/// # fn main() -> Result<(), bastion_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("bastion.toml")?
///     .with_dotenv()
///     .with_env_prefix("BASTION")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: BastionConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BastionConfig::default(),
            env_prefix: None,
        }
    }

    /// Starts from the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = BastionConfig::development();
        self
    }

    /// Starts from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = BastionConfig::production();
        self
    }

    /// Loads a TOML or JSON file, chosen by extension.
    ///
    /// Sections absent from the file keep their defaults.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.config = Self::parse(&content, &format)
            .map_err(|e| match e {
                ConfigError::UnsupportedFormat(_) => {
                    ConfigError::UnsupportedFormat(path.display().to_string())
                }
                other => other,
            })?;
        Ok(self)
    }

    /// Loads a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in the given format ("toml" or "json").
    ///
    /// ```
    /// use bastion_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[gateway]\nrefresh_interval_ms = 60000", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.gateway.refresh_interval_ms, 60_000);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = Self::parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Reads a `.env` file into the process environment if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Enables overrides from environment variables with this prefix.
    ///
    /// For example, with prefix "BASTION":
    /// - `BASTION__GATEWAY__REFRESH_INTERVAL_MS=60000`
    /// - `BASTION__SERVICE__EXPOSE_METADATA=true`
    /// - `BASTION__DISCOVERY__SERVICES=orders,billing=http://billing:8081`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Applies environment overrides from the process environment and
    /// validates.
    pub fn load(self) -> Result<BastionConfig, ConfigError> {
        self.load_with_vars(env::vars())
    }

    /// Like [`ConfigLoader::load`] with an explicit variable set.
    pub fn load_with_vars<I>(mut self, vars: I) -> Result<BastionConfig, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        if let Some(prefix) = self.env_prefix.take() {
            let mut vars: Vec<(String, String)> = vars
                .into_iter()
                .filter(|(k, _)| k.starts_with(&prefix))
                .collect();
            vars.sort();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without env overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> BastionConfig {
        self.config
    }

    fn parse(content: &str, format: &str) -> Result<BastionConfig, ConfigError> {
        match format {
            "toml" => Ok(toml::from_str(content)?),
            "json" => Ok(serde_json::from_str(content)?),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };
        let parts: Vec<&str> = rest.split("__").collect();
        let gateway = &mut self.config.gateway;

        match parts.as_slice() {
            ["GATEWAY", "LISTEN_ADDR"] => gateway.listen_addr = value.to_string(),
            ["GATEWAY", "REFRESH_INTERVAL_MS"] => {
                gateway.refresh_interval_ms = parse_u64(key, value)?;
            }
            ["GATEWAY", "INITIAL_DELAY_MS"] => gateway.initial_delay_ms = parse_u64(key, value)?,
            ["GATEWAY", "EXCLUDED_SERVICE_NAMES"] => {
                gateway.excluded_service_names = parse_list(value);
            }
            ["GATEWAY", "EXEMPT_PATHS"] => gateway.exempt_paths = parse_list(value),
            ["GATEWAY", "ROLE_PREFIX"] => gateway.role_prefix = value.to_string(),
            ["GATEWAY", "RULES_PATH"] => gateway.rules_path = value.to_string(),
            ["GATEWAY", "SERVICE_URL_TEMPLATE"] => {
                gateway.service_url_template = value.to_string();
            }
            ["GATEWAY", "ADMIN_RELOAD_PATH"] => gateway.admin_reload_path = value.to_string(),
            ["GATEWAY", "AUTHORIZE_PATH"] => gateway.authorize_path = value.to_string(),

            ["SERVICE", "NAME"] => self.config.service.name = value.to_string(),
            ["SERVICE", "BASE_PATH"] => self.config.service.base_path = value.to_string(),
            ["SERVICE", "EXPOSE_METADATA"] => {
                self.config.service.expose_metadata = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["SERVICE", "RULES_PATH"] => self.config.service.rules_path = value.to_string(),

            ["DISCOVERY", "SERVICES"] => {
                self.config.discovery.services = parse_list(value)
                    .into_iter()
                    .map(|entry| match entry.split_once('=') {
                        Some((name, url)) => StaticService {
                            name: name.trim().to_string(),
                            url: Some(url.trim().to_string()),
                        },
                        None => StaticService {
                            name: entry,
                            url: None,
                        },
                    })
                    .collect();
            }

            ["CREDENTIALS", "MODE"] => {
                self.config.credentials.mode = match value.to_lowercase().as_str() {
                    "trusted-headers" | "trusted_headers" => CredentialMode::TrustedHeaders,
                    "anonymous" => CredentialMode::Anonymous,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'trusted-headers' or 'anonymous'",
                        ))
                    }
                };
            }

            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                self.config.telemetry.logging.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                self.config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "JSON_FORMAT"] => {
                self.config.telemetry.logging.json_format = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                self.config.telemetry.metrics.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => {
                self.config.telemetry.metrics.addr = value.to_string();
            }

            // Unknown keys are ignored so unrelated variables sharing the
            // prefix do not break startup.
            _ => {}
        }

        Ok(())
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
