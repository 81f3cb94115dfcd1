//! Command line entry point.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use clap::Parser;
use padrelay_config::defaults::DEFAULT_CONFIG_PATH;
use padrelay_config::{Config, load_config};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::SupervisorError;
use crate::supervisor::Supervisor;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "padrelay",
    version,
    about = "TLS relay that re-encrypts traffic and can hide record lengths"
)]
pub struct RelayArgs {
    /// Config file path (toml).
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level override (e.g. "info", "debug", "trace").
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Load the configuration, start every relay and run until interrupted.
pub async fn run(args: RelayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args.config)
        .map_err(|e| format!("failed to load config file {:?}: {e}", args.config))?;

    init_tracing(args.log_level.as_deref().unwrap_or(&config.logging.level));

    run_until(&config, shutdown_signal_handler()).await?;
    Ok(())
}

/// Start every relay, wait for `shutdown`, then stop accepting.
///
/// Connections in progress are not waited for.
pub async fn run_until<F>(config: &Config, shutdown: F) -> Result<(), SupervisorError>
where
    F: Future<Output = ()>,
{
    let supervisor = Supervisor::start(config).await?;
    shutdown.await;
    info!("shutdown signal received");
    supervisor.shutdown();
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arguments() {
        let args = RelayArgs::parse_from(["padrelay"]);
        assert_eq!(args.config, PathBuf::from("padrelay.toml"));
        assert!(args.log_level.is_none());

        let args = RelayArgs::parse_from(["padrelay", "-c", "/etc/padrelay.toml", "--log-level", "debug"]);
        assert_eq!(args.config, PathBuf::from("/etc/padrelay.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[tokio::test]
    async fn missing_config_is_an_error() {
        let args = RelayArgs {
            config: PathBuf::from("/nonexistent/padrelay.toml"),
            log_level: None,
        };
        assert!(run(args).await.is_err());
    }
}
