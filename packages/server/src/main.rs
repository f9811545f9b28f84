//! The creek server binary.
//!
//! Loads the config, installs the tracing subscriber at the configured
//! level, then serves until SIGINT/SIGTERM or a client `SHUTDOWN`.
//! Configuration failures and startup I/O failures exit non-zero;
//! a signalled shutdown drains and exits 0.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use creek_server::{Config, Server};

#[derive(Debug, Parser)]
#[command(name = "creek-server", version, about = "Creek key-value store server")]
struct Args {
    /// Path to the key=value config file.
    #[arg(long, env = "CREEK_CONF_FILE", default_value = creek_server::config::DEFAULT_CONFIG_FILE)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_file(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut server = Server::new(config)?;
    server.start().await?;

    tokio::select! {
        result = server.serve() => result?,
        () = shutdown_signal() => info!("signal received, shutting down"),
    }

    server.stop().await;
    info!("server stopped");
    Ok(())
}

/// Completes on SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
