// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use astra_agent::config::{self, Paths};
use astra_agent::screenshot::X11Capture;
use astra_agent::session;
use astra_agent::state::Agent;

/// Remote monitoring and management agent.
#[derive(Debug, Parser)]
#[command(name = "astra-agent", version, about = "Remote monitoring and management agent.")]
struct Cli {
    /// Path to the embedded (obfuscated) bootstrap config. Defaults to
    /// `assets/config.dat` next to the executable.
    #[arg(long, env = "ASTRA_AGENT_EMBEDDED_CONFIG")]
    embedded_config: Option<PathBuf>,

    /// Directory holding the external settings overlay.
    #[arg(long, env = "ASTRA_AGENT_CONFIG_DIR", default_value = "/etc/astra-agent")]
    config_dir: PathBuf,

    /// Log format (json or text).
    #[arg(long, env = "ASTRA_AGENT_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "ASTRA_AGENT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let version = env!("CARGO_PKG_VERSION");
    info!(version, "starting astra-agent");

    let embedded = cli.embedded_config.clone().unwrap_or_else(default_embedded_path);
    let paths = Paths { config_dir: cli.config_dir.clone() };

    let bootstrap = match config::bootstrap(&embedded, &paths, version) {
        Ok(bootstrap) => bootstrap,
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    };

    let agent = Agent::new(bootstrap.config, paths, bootstrap.settings, Arc::new(X11Capture)).await;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    session::run(agent, shutdown).await;
}

/// Cancel the shutdown token on SIGINT or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!(err = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received, stopping"),
        _ = term.recv() => info!("termination requested, stopping"),
    }
    shutdown.cancel();
}

/// `assets/config.dat` beside the executable (the bundle layout).
fn default_embedded_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("assets/config.dat")))
        .unwrap_or_else(|| PathBuf::from("assets/config.dat"))
}

/// Initialize tracing from the CLI, honoring `RUST_LOG` when the level
/// flag is left at its default.
fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;

    let filter = if std::env::var("ASTRA_AGENT_LOG_LEVEL").is_err() && cli.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level))
    } else {
        EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match cli.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}
