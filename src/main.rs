//! socks-forwarder - Local SOCKS5 forwarding proxy
//!
//! Starts the forwarding listener from a configuration file and keeps it
//! running until interrupted.

use anyhow::{anyhow, Result};
use clap::Parser;
use socks_forwarder::config::load_config;
use socks_forwarder::ForwardingProxy;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Local TCP listener that tunnels every connection through a SOCKS5 proxy
#[derive(Parser, Debug)]
#[command(name = "socks-forwarder")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level, args.json_log)?;

    let config = load_config(&args.config)?;
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    info!("socks-forwarder v{}", socks_forwarder::VERSION);
    info!("Configuration loaded from: {:?}", args.config);
    info!("SOCKS5 proxy: {}", config.socks.proxy_endpoint);
    info!("Remote endpoint: {}", config.remote_endpoint);

    let proxy = ForwardingProxy::new(config);
    proxy.set_error_handler(|e| warn!("{}", e));

    let port = proxy.start().await?;
    info!("Forwarding 127.0.0.1:{}", port);

    wait_for_shutdown().await?;

    proxy.stop().await;
    let stats = proxy.stats().snapshot();
    info!(
        "Stopped after {} connection(s), {} bytes up, {} bytes down",
        stats.connections_accepted, stats.bytes_upstream, stats.bytes_downstream
    );

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

/// Setup logging; `RUST_LOG` overrides `--log-level` when set
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
