//! Tutor Daemon - Chat Streaming Server
//!
//! Serves the ai-teacher chat endpoint over HTTP. Each accepted request
//! becomes one stream session whose fragments are pushed to the client as
//! server-sent events while they are produced.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:3001)
//! tutor-daemon
//!
//! # Custom bind address
//! tutor-daemon --host 0.0.0.0 --port 8080
//!
//! # With config file
//! tutor-daemon --config /etc/ai-teacher/tutor.toml
//!
//! # Verbose logging
//! RUST_LOG=debug tutor-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Stop accepting, cancel open streams, wait for the
//!   registry to drain up to the configured grace period

mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tutor_core::{load_config_from_path, ConfigOverrides, EchoProducer};

use server::{build_router, AppState};

/// Tutor Daemon - Incremental chat streaming for ai-teacher
#[derive(Parser, Debug)]
#[command(name = "tutor-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "TUTOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Interface to bind (overrides HOST and the config file)
    #[arg(long, value_name = "ADDR")]
    host: Option<String>,

    /// Port to listen on (overrides PORT and the config file)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Seconds a stream may wait for its next fragment
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "TUTOR_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "tutor_daemon={level},tutor_core={level},tower_http={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(())
}

/// Resolve when SIGTERM or SIGINT arrives
async fn shutdown_signal() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level)?;

    info!("Tutor Daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration: file < env < CLI
    let config_path = args.config.clone().or_else(tutor_core::default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(host) = args.host {
        overrides = overrides.with_host(host);
    }
    if let Some(port) = args.port {
        overrides = overrides.with_port(port);
    }
    if let Some(secs) = args.idle_timeout {
        overrides = overrides.with_idle_timeout_secs(secs);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line configuration")?;

    info!(
        source = %config.source(),
        config_file = ?config.config_file_path,
        idle_timeout_secs = config.idle_timeout.as_secs(),
        max_message_length = config.max_message_length,
        "Configuration loaded"
    );

    let bind_addr = config.bind_addr();
    let grace = config.shutdown_grace;

    let shutdown = CancellationToken::new();
    let state =
        AppState::new(Arc::new(EchoProducer::new()), config).with_shutdown(shutdown.clone());
    let registry = state.registry.clone();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "Listening");

    // Signal handler task
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(name) => info!(signal = name, "Received signal, initiating shutdown"),
            Err(e) => error!(error = %e, "Signal handling failed, shutting down"),
        }
        signal_token.cancel();
    });

    // Open streams would hold graceful shutdown forever, so cancel them as
    // soon as the listener stops accepting
    let drain_token = shutdown.clone();
    let drain_registry = registry.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                drain_token.cancelled().await;
                let cancelled = drain_registry.cancel_all();
                info!(sessions = cancelled, "Cancelling open streams");
            })
            .await
    });

    tokio::select! {
        joined = &mut server => {
            joined
                .context("Server task panicked")?
                .context("Server stopped unexpectedly")?;
            return Ok(());
        }
        () = shutdown.cancelled() => {}
    }

    info!("Shutting down...");

    // Catch streams admitted while the first sweep ran
    registry.cancel_all();

    if !registry.wait_idle(grace).await {
        warn!(
            remaining = registry.count(),
            grace_secs = grace.as_secs(),
            "Grace period elapsed with streams still open"
        );
    }

    match tokio::time::timeout(grace, server).await {
        Ok(joined) => {
            joined
                .context("Server task panicked")?
                .context("Server stopped with error")?;
            info!("Tutor daemon stopped cleanly");
        }
        Err(_) => warn!("Server did not finish draining connections; exiting"),
    }

    Ok(())
}
