//! Topograph: serves a workload topology graph built from container and
//! network flow events stored in InfluxDB.

mod commands;
mod logging;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use topograph_core::config::ConfigOverrides;
use topograph_core::server::{self, AppState};
use topograph_core::{
    EventSource, InfluxClient, LogFormat, RefreshScheduler, SnapshotStore, TopographConfig,
};
use tracing::{info, warn};

/// Topograph: workload topology graphs from container and flow events
#[derive(Parser, Debug)]
#[command(name = "topograph", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address the HTTP server listens on
    #[arg(long)]
    listen_address: Option<String>,

    /// InfluxDB URL
    #[arg(long)]
    influx_url: Option<String>,

    /// InfluxDB username
    #[arg(long)]
    influx_username: Option<String>,

    /// InfluxDB password
    #[arg(long)]
    influx_password: Option<String>,

    /// InfluxDB database holding the events
    #[arg(long)]
    influx_db: Option<String>,

    /// Accept invalid TLS certificates from InfluxDB (true/false)
    #[arg(long)]
    db_skip_tls: Option<bool>,

    /// Refresh interval in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: human, json
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Validate the effective configuration
    Check,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen_address: self.listen_address.clone(),
            influx_url: self.influx_url.clone(),
            influx_username: self.influx_username.clone(),
            influx_password: self.influx_password.clone(),
            influx_database: self.influx_db.clone(),
            skip_tls_verify: self.db_skip_tls,
            interval_secs: self.interval,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = topograph_core::load_config(cli.config.as_deref(), &cli.overrides())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(Commands::Config { action }) = &cli.command {
        return commands::handle_config(action, &config);
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let level = logging::level_directive(&config.logging.level, cli.verbose, cli.quiet);
    let _guard = logging::init_tracing(config.logging.format, level);

    serve(config).await
}

/// Connect to the store, start refreshing and serve until a shutdown signal.
async fn serve(config: TopographConfig) -> anyhow::Result<()> {
    let address = config.server.socket_addr()?;

    let client = InfluxClient::connect(&config.store)
        .await
        .map_err(|e| anyhow::anyhow!("Unable to connect to InfluxDB at {}: {}", config.store.url, e))?;
    let source = EventSource::new(
        Arc::new(client),
        config.store.database.clone(),
        config.store.query_timeout(),
    );

    let scheduler = RefreshScheduler::new(source, SnapshotStore::new(), &config.refresh);
    let state = AppState::new(scheduler.reader());

    let shutdown = CancellationToken::new();
    let refresh = tokio::spawn(scheduler.run(shutdown.child_token()));
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let listener = TcpListener::bind(address)
        .await
        .map_err(|e| anyhow::anyhow!("Unable to listen on {}: {}", address, e))?;
    server::run(
        listener,
        state,
        config.server.request_timeout(),
        shutdown.clone(),
    )
    .await?;

    shutdown.cancel();
    if let Err(e) = refresh.await {
        warn!(error = %e, "Refresh task ended abnormally");
    }
    info!("Topograph stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "topograph",
            "--influx-url",
            "http://metrics:8086",
            "--influx-db",
            "events",
            "--db-skip-tls",
            "false",
            "--interval",
            "5",
            "--log-format",
            "json",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.influx_url.as_deref(), Some("http://metrics:8086"));
        assert_eq!(overrides.influx_database.as_deref(), Some("events"));
        assert_eq!(overrides.skip_tls_verify, Some(false));
        assert_eq!(overrides.interval_secs, Some(5));
        assert_eq!(overrides.log_format, Some(LogFormat::Json));
        assert_eq!(overrides.listen_address, None);
    }

    #[test]
    fn test_cli_config_show_subcommand() {
        let cli = Cli::try_parse_from(["topograph", "-vv", "config", "show"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["topograph", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
