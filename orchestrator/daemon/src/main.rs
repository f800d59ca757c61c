//! Parley Daemon
//!
//! Standalone process hosting the orchestration core and its admin surface.
//! The conversation itself runs between the visitor's browser and the
//! provider; this daemon owns the agent state and serves read-only debug and
//! export endpoints for the operator.
//!
//! # Usage
//!
//! ```bash
//! # Start with the default bind address (127.0.0.1:8200)
//! parley-daemon
//!
//! # Custom bind address and config file
//! parley-daemon --bind 0.0.0.0:9000 --config /etc/parley/parley.toml
//!
//! # With verbose logging
//! RUST_LOG=debug parley-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `PARLEY_BIND_ADDR`: Admin surface bind address
//! - `PARLEY_ADMIN_TOKEN`: Bearer token guarding the admin surface
//! - `PARLEY_REALTIME_API_KEY` / `PARLEY_AGENT_API_KEY`: Provider credentials
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Files
//!
//! - Config: `~/.config/parley/parley.toml`
//! - PID file: `$XDG_RUNTIME_DIR/parley/parley.pid` (or `/tmp/parley-$UID/parley.pid`)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown (removes PID file)
//! - SIGHUP: Re-read the config file and log what changed source

mod server;

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use parley_core::config::{default_config_path, load_config_from_path, ParleyConfig};
use parley_core::{MemoryHistory, PromptBundle, StaticContext, ToolRegistry, VoiceAgent};

/// Admin daemon for the Parley conversation orchestrator
#[derive(Debug, Parser)]
#[command(name = "parley-daemon", version, about)]
struct Cli {
    /// Address the admin HTTP surface binds to
    #[arg(long, env = "PARLEY_BIND_ADDR")]
    bind: Option<String>,

    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the PID file
    #[arg(long)]
    pid_file: Option<PathBuf>,
}

/// Get the default PID file path
///
/// Uses XDG_RUNTIME_DIR if available, otherwise /tmp/parley-$UID/
fn default_pid_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("parley").join("parley.pid")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/parley-{uid}/parley.pid"))
    }
}

/// Whether a previously written PID still belongs to a live process
fn pid_is_live(pid: i32) -> bool {
    // Signal 0 probes for existence without delivering anything.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Write the PID file, refusing if another daemon is still running
fn write_pid_file(path: &PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    if let Ok(existing) = fs::read_to_string(path) {
        if let Ok(pid) = existing.trim().parse::<i32>() {
            if pid_is_live(pid) {
                anyhow::bail!("another daemon is running with PID {pid}");
            }
            warn!(stale_pid = pid, "Removing stale PID file");
        }
    }

    let pid = std::process::id();
    let mut file = fs::File::create(path)?;
    writeln!(file, "{pid}")?;

    info!(pid = pid, path = ?path, "PID file created");
    Ok(())
}

/// Remove the PID file
fn remove_pid_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = ?path, "Failed to remove PID file");
        } else {
            info!(path = ?path, "PID file removed");
        }
    }
}

/// Resolves when SIGTERM or Ctrl+C arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}

/// Re-read the config file on SIGHUP
///
/// Most values only apply at startup; the reload logs what it found so the
/// operator can confirm the file parses before restarting.
#[cfg(unix)]
fn spawn_reload_task(config_path: Option<PathBuf>) {
    tokio::spawn(async move {
        let Ok(mut hangup) = signal::unix::signal(signal::unix::SignalKind::hangup()) else {
            warn!("Failed to install SIGHUP handler");
            return;
        };
        while hangup.recv().await.is_some() {
            match load_config_from_path(config_path.clone()) {
                Ok(config) => info!(
                    source = %config.source(),
                    "Config re-read on SIGHUP; restart to apply"
                ),
                Err(e) => error!(error = %e, "Config reload failed"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("parley_daemon=info".parse()?)
                .add_directive("parley_core=info".parse()?),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("Starting Parley Daemon");
    info!("PID: {}", std::process::id());

    let config_path = cli.config.clone().or_else(default_config_path);
    let mut config: ParleyConfig = load_config_from_path(config_path.clone())?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
        config.set_source(parley_core::ConfigSource::Cli);
    }

    let pid_path = cli.pid_file.unwrap_or_else(default_pid_path);
    if let Err(e) = write_pid_file(&pid_path) {
        error!(error = %e, "Failed to write PID file");
        return Err(e);
    }

    if config.admin_token.is_none() {
        warn!("No admin token configured; admin endpoints will refuse requests");
    }

    // Tools are registered by the embedding site server; the daemon hosts
    // the agent and its admin surface.
    let agent = Arc::new(VoiceAgent::new(
        Arc::new(ToolRegistry::new()),
        Arc::new(MemoryHistory::new()),
        Arc::new(StaticContext::new(PromptBundle::default())),
        config.reconnect,
    ));

    #[cfg(unix)]
    spawn_reload_task(config_path);

    let app = server::router(server::AppState::new(
        Arc::clone(&agent),
        config.admin_token.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %config.bind_addr, "Failed to bind admin surface");
            remove_pid_file(&pid_path);
            anyhow::anyhow!("Failed to bind {}: {e}", config.bind_addr)
        })?;
    info!(addr = %config.bind_addr, "Admin surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            remove_pid_file(&pid_path);
            anyhow::anyhow!("Server error: {e}")
        })?;

    info!("Performing graceful shutdown...");
    agent.end_session().await.ok();
    remove_pid_file(&pid_path);
    info!("Parley daemon stopped cleanly");
    Ok(())
}
