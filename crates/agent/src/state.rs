// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared agent state handed to every command handler.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::command::exec;
use crate::config::{AgentConfig, Paths};
use crate::screenshot::CaptureBackend;
use crate::settings::{self, Settings};
use crate::shell::ShellSlot;
use crate::telemetry::{self, NetWatermark};
use crate::transfer::download::Downloads;
use crate::transfer::upload::UploadSlot;

/// Everything a handler can touch. Single-owner resources (the upload
/// context, the interactive session) live behind take-and-replace slots;
/// the rest is plain shared state.
pub struct Agent {
    pub config: AgentConfig,
    pub paths: Paths,
    pub settings: RwLock<Settings>,
    /// Last network counters, for rate derivation.
    pub net: Mutex<NetWatermark>,
    /// Working directory for `execute`, moved only by `cd`.
    pub cwd: RwLock<PathBuf>,
    pub upload: UploadSlot,
    pub shell: Arc<ShellSlot>,
    pub downloads: Arc<Downloads>,
    pub capture: Arc<dyn CaptureBackend>,
    pub hostname: String,
    pub os_type: String,
    pub platform: String,
    pub local_ip: String,
}

impl Agent {
    /// Probe the host once and assemble the shared state.
    pub async fn new(
        config: AgentConfig,
        paths: Paths,
        settings: Settings,
        capture: Arc<dyn CaptureBackend>,
    ) -> Arc<Self> {
        let hostname = nix::unistd::gethostname()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_owned());
        let local_ip = telemetry::local_ip();
        let os_type = telemetry::os_type().await;
        let platform = telemetry::platform_full().await;

        let home = exec::home_dir();
        let cwd = if home.is_dir() { home } else { PathBuf::from("/") };

        let (rx, tx) = telemetry::network_io().await;
        debug!(%hostname, %local_ip, "agent state initialized");

        Arc::new(Self {
            config,
            paths,
            settings: RwLock::new(settings),
            net: Mutex::new(NetWatermark::now(rx, tx)),
            cwd: RwLock::new(cwd),
            upload: UploadSlot::default(),
            shell: Arc::new(ShellSlot::default()),
            downloads: Arc::new(Downloads::default()),
            capture,
            hostname,
            os_type,
            platform,
            local_ip,
        })
    }

    /// Persist the current settings to the external config file.
    pub async fn save_settings(&self) {
        let snapshot = self.settings.read().await.clone();
        let path = self.paths.config_file();
        let _ = tokio::task::spawn_blocking(move || settings::save(&path, &snapshot)).await;
    }
}
