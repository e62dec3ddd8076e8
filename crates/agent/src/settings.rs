// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutable agent settings with a persisted JSON overlay.
//!
//! Server-sent updates arrive as partial JSON objects and are merged over
//! the current values with range clamps applied. The merge is idempotent:
//! applying the same patch twice yields the same persisted output.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

/// How much of the desktop a capture covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    All,
    Primary,
}

impl MonitorMode {
    /// Parse a server-sent value; anything unrecognized falls back to `All`.
    fn parse(value: &Value) -> Option<Self> {
        match value.as_str() {
            Some("primary") => Some(Self::Primary),
            Some(_) => Some(Self::All),
            None => None,
        }
    }
}

/// Screen capture settings. `quality` is clamped to 1–100 and
/// `refresh_delay` to 1–60 seconds on every merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotSettings {
    pub quality: u8,
    pub refresh_delay: u64,
    pub enabled: bool,
    pub monitor_mode: MonitorMode,
}

impl Default for ScreenshotSettings {
    fn default() -> Self {
        Self { quality: 85, refresh_delay: 5, enabled: false, monitor_mode: MonitorMode::All }
    }
}

impl ScreenshotSettings {
    /// Merge a server-sent patch, clamping each field to its valid range.
    pub fn merge(&mut self, patch: &Value) {
        if let Some(quality) = patch.get("quality").and_then(Value::as_i64) {
            self.quality = quality.clamp(1, 100) as u8;
        }
        if let Some(delay) = patch.get("refresh_delay").and_then(Value::as_i64) {
            self.refresh_delay = delay.clamp(1, 60) as u64;
        }
        if let Some(enabled) = patch.get("enabled").and_then(Value::as_bool) {
            self.enabled = enabled;
        }
        if let Some(mode) = patch.get("monitor_mode").and_then(MonitorMode::parse) {
            self.monitor_mode = mode;
        }
    }
}

/// Mutable settings, persisted as JSON in the external config file.
///
/// `client_id` is assigned once at bootstrap and is immune to server-sent
/// updates and external-overlay merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Telemetry emit interval in seconds.
    pub monitoring_interval: u64,
    /// Reconnect backoff base delay in seconds.
    pub reconnect_delay: u64,
    /// Reconnect backoff cap in seconds.
    pub reconnect_max_delay: u64,
    /// Uniform jitter fraction applied to each reconnect delay.
    pub reconnect_jitter: f64,
    /// Free-form operator note shown in the server GUI.
    pub info_text: String,
    /// Operator-assigned tags.
    pub tags: Vec<String>,
    pub screenshot: ScreenshotSettings,
    /// Stable 128-bit identifier, hex-encoded. Generated on first run.
    pub client_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            monitoring_interval: 10,
            reconnect_delay: 5,
            reconnect_max_delay: 60,
            reconnect_jitter: 0.2,
            info_text: String::new(),
            tags: Vec::new(),
            screenshot: ScreenshotSettings::default(),
            client_id: None,
        }
    }
}

impl Settings {
    /// Merge a JSON object over the current settings. Unknown keys are
    /// ignored, `client_id` is never taken from the patch, and screenshot
    /// fields are re-clamped.
    pub fn merge(&mut self, patch: &Value) {
        let Some(obj) = patch.as_object() else { return };
        if let Some(interval) = obj.get("monitoring_interval").and_then(Value::as_u64) {
            self.monitoring_interval = interval.max(1);
        }
        if let Some(delay) = obj.get("reconnect_delay").and_then(Value::as_u64) {
            self.reconnect_delay = delay.max(1);
        }
        if let Some(max) = obj.get("reconnect_max_delay").and_then(Value::as_u64) {
            self.reconnect_max_delay = max.max(1);
        }
        if let Some(jitter) = obj.get("reconnect_jitter").and_then(Value::as_f64) {
            self.reconnect_jitter = jitter.clamp(0.0, 1.0);
        }
        if let Some(text) = obj.get("info_text").and_then(Value::as_str) {
            self.info_text = text.to_owned();
        }
        if let Some(tags) = obj.get("tags").and_then(Value::as_array) {
            self.tags = tags.iter().filter_map(Value::as_str).map(str::to_owned).collect();
        }
        if let Some(screenshot) = obj.get("screenshot") {
            self.screenshot.merge(screenshot);
        }
    }

    /// Settings as sent to the server: everything except `client_id`.
    pub fn public_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.remove("client_id");
        }
        value
    }
}

/// Persist settings to the external config file, creating the directory
/// if needed. Failures are logged, not fatal: the agent keeps running on
/// its in-memory settings.
pub fn save(path: &Path, settings: &Settings) {
    let result = (|| -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
        Ok(())
    })();
    match result {
        Ok(()) => info!(path = %path.display(), "settings saved"),
        Err(e) => error!(path = %path.display(), err = %e, "failed to save settings"),
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
