// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrap configuration.
//!
//! Connection parameters (server host/port, auth token) ship inside the
//! bundle as an obfuscated blob; an optional external JSON file overlays
//! the mutable settings. The obfuscation is tamper deterrence, not
//! security: outer base64 → XOR with a fixed key → inner base64 → JSON.
//! The transformation and key must not change, or existing bundles stop
//! decoding.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tracing::{info, warn};

use crate::settings::{self, Settings};

/// Fixed key for the embedded-config obfuscation.
pub const OBFUSCATION_KEY: &str = "AstraMonitorKey2024!@#";

/// Protocol revision advertised in the auth frame.
pub const PROTOCOL_VERSION: u32 = 1;

/// Capabilities advertised in the auth frame.
pub const CAPABILITIES: [&str; 3] = ["command_ack", "file_chunked", "screenshots"];

/// Immutable agent identity and connection parameters, fixed at bootstrap.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub server_host: String,
    pub server_port: u16,
    pub auth_token: String,
    /// Stable 128-bit hex identifier, persisted across restarts.
    pub client_id: String,
    pub version: String,
}

/// Filesystem locations resolved from the CLI.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Directory holding the external settings overlay.
    pub config_dir: PathBuf,
}

impl Paths {
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }
}

/// Decode an obfuscated config blob into its JSON value.
pub fn deobfuscate(blob: &str, key: &str) -> anyhow::Result<Value> {
    let key = key.as_bytes();
    if key.is_empty() {
        bail!("empty obfuscation key");
    }
    let xored = STANDARD.decode(blob.trim().as_bytes()).context("outer base64 layer")?;
    let inner: Vec<u8> = xored.iter().enumerate().map(|(i, b)| b ^ key[i % key.len()]).collect();
    let json = STANDARD.decode(&inner).context("inner base64 layer")?;
    serde_json::from_slice(&json).context("embedded config JSON")
}

/// Inverse of [`deobfuscate`]; used by the bundle builder and tests.
pub fn obfuscate(config: &Value, key: &str) -> String {
    let key = key.as_bytes();
    let inner = STANDARD.encode(serde_json::to_vec(config).unwrap_or_default());
    let xored: Vec<u8> = inner
        .as_bytes()
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ key[i % key.len().max(1)])
        .collect();
    STANDARD.encode(&xored)
}

/// Result of bootstrap: fixed identity plus the initial mutable settings.
#[derive(Debug)]
pub struct Bootstrap {
    pub config: AgentConfig,
    pub settings: Settings,
}

/// Load the embedded blob, overlay the external file, and fix the client
/// identity. Missing host or token is fatal: the agent cannot run without
/// a baked-in destination.
pub fn bootstrap(embedded_path: &Path, paths: &Paths, version: &str) -> anyhow::Result<Bootstrap> {
    let blob = std::fs::read_to_string(embedded_path)
        .with_context(|| format!("embedded config not found at {}", embedded_path.display()))?;
    let embedded = deobfuscate(&blob, OBFUSCATION_KEY)?;
    info!("embedded configuration loaded");

    let server_host = embedded.get("server_host").and_then(Value::as_str).map(str::to_owned);
    let server_port = embedded.get("server_port").and_then(Value::as_u64).unwrap_or(8765) as u16;
    let auth_token = embedded.get("auth_token").and_then(Value::as_str).map(str::to_owned);

    let (Some(server_host), Some(auth_token)) = (server_host, auth_token) else {
        bail!("server host or auth token missing from the embedded config; rebuild the bundle with both baked in");
    };

    let mut settings = Settings::default();
    settings.merge(&embedded);

    if let Some(external) = load_external(&paths.config_file()) {
        info!(path = %paths.config_file().display(), "external configuration loaded");
        for key in ["server_host", "server_port", "auth_token"] {
            if external.get(key).is_some() {
                warn!("external config may not override {key}; the key is ignored");
            }
        }
        settings.merge(&external);
        if let Some(id) = external.get("client_id").and_then(Value::as_str) {
            settings.client_id = Some(id.to_owned());
        }
    }

    let client_id = ensure_client_id(&mut settings, paths);

    Ok(Bootstrap {
        config: AgentConfig {
            server_host,
            server_port,
            auth_token,
            client_id,
            version: version.to_owned(),
        },
        settings,
    })
}

fn load_external(path: &Path) -> Option<Value> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), err = %e, "external config is not valid JSON, ignoring");
            None
        }
    }
}

/// Return the persisted client id, generating and saving a fresh one on
/// first run.
fn ensure_client_id(settings: &mut Settings, paths: &Paths) -> String {
    if let Some(id) = settings.client_id.as_deref() {
        let id = id.trim();
        if !id.is_empty() {
            return id.to_owned();
        }
    }
    let id = uuid::Uuid::new_v4().simple().to_string();
    settings.client_id = Some(id.clone());
    settings::save(&paths.config_file(), settings);
    id
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
