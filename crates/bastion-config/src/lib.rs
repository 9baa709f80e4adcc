//! Typed, layered configuration for Bastion.
//!
//! Configuration comes from built-in defaults, then an optional TOML or JSON
//! file, then `BASTION__SECTION__KEY` environment variables. Unknown fields
//! in files are rejected.
//!
//! ```toml
//! [gateway]
//! listen_addr = "0.0.0.0:8080"
//! refresh_interval_ms = 300000
//! initial_delay_ms = 10000
//! excluded_service_names = ["gateway", "sib-registry"]
//!
//! [[discovery.services]]
//! name = "orders"
//! url = "http://orders.internal:8081"
//!
//! [credentials]
//! mode = "trusted-headers"
//!
//! [telemetry.logging]
//! level = "info"
//! json_format = true
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::BastionConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    CredentialMode, CredentialSettings, DiscoverySettings, GatewaySettings, ServiceSettings,
    StaticService, TelemetrySettings,
};
