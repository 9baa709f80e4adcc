//! Bastion gateway entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use bastion_config::ConfigLoader;
use bastion_gateway::Gateway;
use bastion_telemetry::{init_logging, init_metrics};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("bastion-gateway {}", bastion_gateway::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Bastion Gateway - per-endpoint authorization from service-published rules

USAGE:
    bastion-gateway [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    BASTION__GATEWAY__LISTEN_ADDR          Listen address (default: 0.0.0.0:8080)
    BASTION__GATEWAY__REFRESH_INTERVAL_MS  Periodic refresh interval (default: 300000)
    BASTION__GATEWAY__SERVICE_URL_TEMPLATE Base URL per service, `{{service}}` is substituted
    BASTION__CREDENTIALS__MODE             trusted-headers | anonymous
    BASTION__TELEMETRY__METRICS__ENABLED   Serve Prometheus metrics

    A .env file in the working directory is read first.

EXAMPLES:
    bastion-gateway --config /etc/bastion/gateway.toml
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_dotenv().with_env_prefix("BASTION");
    if let Some(path) = &args.config {
        loader = loader
            .with_file(path)
            .with_context(|| format!("reading {}", path.display()))?;
    }
    let config = loader.load().context("invalid configuration")?;

    init_logging(&config.telemetry.logging).context("initializing logging")?;
    init_metrics(&config.telemetry.metrics).context("initializing metrics")?;

    info!(version = bastion_gateway::VERSION, "starting bastion gateway");

    let gateway = Arc::new(Gateway::from_config(&config)?);
    gateway.start()?;

    let listener = TcpListener::bind(&config.gateway.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.gateway.listen_addr))?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    Arc::clone(&gateway).serve(listener, shutdown).await?;
    gateway.stop().await;
    info!("bastion gateway stopped");
    Ok(())
}
