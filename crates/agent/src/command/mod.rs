// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound command parsing and dispatch.
//!
//! Commands arrive as colon-delimited text inside a JSON envelope. Each
//! is parsed once at ingress into a typed [`Command`], then routed.
//! Handlers that can run long (subprocesses, captures, streams) are
//! spawned off the session loop and deliver their own responses, with
//! the originating `command_id` attached. When a command carries an id,
//! an ack frame is emitted before the handler runs.

pub mod apt;
pub mod exec;
pub mod fs;
pub mod package;

use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::state::Agent;
use crate::transfer::download;
use crate::transport::Outbound;
use crate::wire::{self, CommandFrame};
use crate::{notify, screenshot, sysinfo, telemetry};

/// A fully parsed command verb.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    ListFiles { path: String },
    DownloadFileChunked { chunk_size: usize, path: String },
    CancelDownload { path: String },
    ScreenshotSettings { patch: Value },
    GetFullSystemInfo,
    GetScreenshotSettings,
    UploadFileStart { path: String, size: u64 },
    UploadFileChunk { data: String },
    UploadFileEnd { hash: Option<String> },
    CancelUpload { path: String },
    ApplySettings { patch: Value },
    Delete { path: String },
    CreateFolder { path: String },
    RenamePath { old: String, new: String },
    Apt(AptCommand),
    Interactive(InteractiveCommand),
    InstallPackage { path: String },
    ScreenshotQuality { quality: u8 },
    Screenshot,
    GetSettings,
    Shutdown,
    Reboot,
    Execute { line: String },
    ShowMessage { text: String },
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AptCommand {
    GetRepos,
    SaveRepo { path: String, content_b64: String },
    Update,
    ListUpgradable,
    UpgradePackages { names: String },
    FullUpgrade,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractiveCommand {
    Start { command: String },
    Input { data: String },
    Stop,
    Resize { rows: u16, cols: u16 },
    Unknown(String),
}

impl Command {
    /// Split a raw command string into a typed verb. The verb is the text
    /// before the first colon; argument shapes use bounded splits per
    /// verb. Malformed arguments are an error; an unrecognized verb is
    /// `Command::Unknown`.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let (verb, rest) = match raw.split_once(':') {
            Some((verb, rest)) => (verb, Some(rest)),
            None => (raw, None),
        };

        let command = match (verb, rest) {
            ("refresh", None) => Self::Refresh,
            ("list_files", Some(path)) => Self::ListFiles { path: path.to_owned() },
            ("download_file_chunked", Some(payload)) => {
                // Two-way split: a leading all-digit token is the chunk size.
                match payload.split_once(':') {
                    Some((size, path))
                        if !size.is_empty() && size.bytes().all(|b| b.is_ascii_digit()) =>
                    {
                        Self::DownloadFileChunked {
                            chunk_size: size.parse().context("chunk size")?,
                            path: path.to_owned(),
                        }
                    }
                    _ => Self::DownloadFileChunked {
                        chunk_size: download::DEFAULT_CHUNK_SIZE,
                        path: payload.to_owned(),
                    },
                }
            }
            ("cancel_download", Some(path)) => Self::CancelDownload { path: path.to_owned() },
            ("screenshot_settings", Some(patch)) => Self::ScreenshotSettings {
                patch: serde_json::from_str(patch).context("screenshot settings JSON")?,
            },
            ("get_full_system_info", None) => Self::GetFullSystemInfo,
            ("get_screenshot_settings", None) => Self::GetScreenshotSettings,
            ("upload_file_start", Some(args)) => {
                let (path, size) =
                    args.rsplit_once(':').context("upload_file_start needs <path>:<size>")?;
                Self::UploadFileStart {
                    path: path.to_owned(),
                    size: size.trim().parse().context("upload size")?,
                }
            }
            ("upload_file_chunk", Some(data)) => Self::UploadFileChunk { data: data.to_owned() },
            ("upload_file_end", hash) => Self::UploadFileEnd {
                hash: hash.map(str::trim).filter(|h| !h.is_empty()).map(str::to_owned),
            },
            ("cancel_upload", Some(path)) => Self::CancelUpload { path: path.to_owned() },
            ("apply_settings", Some(patch)) => Self::ApplySettings {
                patch: serde_json::from_str(patch).context("settings JSON")?,
            },
            ("delete", Some(path)) => Self::Delete { path: path.to_owned() },
            ("create_folder", Some(path)) => Self::CreateFolder { path: path.to_owned() },
            ("rename_path", Some(args)) => {
                let (old, new) = args.split_once(':').context("rename_path needs <old>:<new>")?;
                Self::RenamePath { old: old.to_owned(), new: new.to_owned() }
            }
            ("apt", Some(rest)) => Self::Apt(AptCommand::parse(rest)),
            ("interactive", Some(rest)) => Self::Interactive(InteractiveCommand::parse(rest)?),
            ("install_package", Some(path)) => Self::InstallPackage { path: path.to_owned() },
            ("screenshot_quality", Some(quality)) => Self::ScreenshotQuality {
                quality: quality.trim().parse::<i64>().context("quality")?.clamp(1, 100) as u8,
            },
            ("screenshot", None) => Self::Screenshot,
            ("get_settings", None) => Self::GetSettings,
            ("shutdown", None) => Self::Shutdown,
            ("reboot", None) => Self::Reboot,
            ("execute", Some(line)) => Self::Execute { line: line.trim().to_owned() },
            ("show_message", Some(text)) => Self::ShowMessage { text: text.to_owned() },
            _ => Self::Unknown(raw.to_owned()),
        };
        Ok(command)
    }
}

impl AptCommand {
    fn parse(rest: &str) -> Self {
        match rest.split_once(':') {
            None => match rest {
                "get_repos" => Self::GetRepos,
                "update" => Self::Update,
                "list_upgradable" => Self::ListUpgradable,
                "full_upgrade" => Self::FullUpgrade,
                other => Self::Unknown(other.to_owned()),
            },
            Some(("save_repo", args)) => match args.split_once(':') {
                Some((path, content_b64)) => Self::SaveRepo {
                    path: path.to_owned(),
                    content_b64: content_b64.to_owned(),
                },
                None => Self::Unknown(rest.to_owned()),
            },
            Some(("upgrade_packages", names)) => Self::UpgradePackages { names: names.to_owned() },
            Some(_) => Self::Unknown(rest.to_owned()),
        }
    }
}

impl InteractiveCommand {
    fn parse(rest: &str) -> anyhow::Result<Self> {
        let (action, payload) = match rest.split_once(':') {
            Some((action, payload)) => (action, Some(payload)),
            None => (rest, None),
        };
        let command = match (action, payload) {
            ("start", payload) => Self::Start { command: payload.unwrap_or("").to_owned() },
            ("input", Some(data)) => Self::Input { data: data.to_owned() },
            ("stop", None) => Self::Stop,
            ("resize", Some(size)) => {
                let (rows, cols) =
                    size.split_once(',').context("resize needs <rows>,<cols>")?;
                Self::Resize {
                    rows: rows.trim().parse().context("rows")?,
                    cols: cols.trim().parse().context("cols")?,
                }
            }
            _ => Self::Unknown(action.to_owned()),
        };
        Ok(command)
    }
}

/// Per-connection dispatch context: where responses go, and the token
/// that ends spawned jobs when the connection dies.
#[derive(Clone)]
pub struct DispatchCtx {
    pub outbound: Outbound,
    pub jobs: CancellationToken,
}

/// Handle one inbound frame end to end: ack, parse, route, respond.
/// Protocol errors answer with an error envelope; the session continues.
pub async fn dispatch(agent: &Arc<Agent>, ctx: &DispatchCtx, raw: &str) {
    let frame: CommandFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(err = %e, "malformed inbound frame");
            let _ = ctx
                .outbound
                .send_json(&json!({ "error": format!("❌ Invalid command frame: {e}") }))
                .await;
            return;
        }
    };
    let Some(raw_command) = frame.command else {
        return; // not a command envelope
    };
    let command_id = frame.command_id;

    if let Some(id) = command_id.as_deref() {
        // The advertised `command_ack` capability: confirm receipt before
        // executing, even for one-way commands.
        let _ = ctx.outbound.send_json(&wire::ack(id)).await;
    }

    let parsed = match Command::parse(&raw_command) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!(command = verb_of(&raw_command), err = %e, "command parse failed");
            let response = json!({ "error": format!("❌ Command execution failed: {e:#}") });
            let _ = ctx
                .outbound
                .send_json(&wire::attach_command_id(response, command_id.as_deref()))
                .await;
            return;
        }
    };

    if let Some(response) = run_command(agent, ctx, parsed, command_id.clone()).await {
        let response = wire::attach_command_id(response, command_id.as_deref());
        let _ = ctx.outbound.send_json(&response).await;
    }
}

fn verb_of(raw: &str) -> &str {
    raw.split(':').next().unwrap_or(raw)
}

async fn run_command(
    agent: &Arc<Agent>,
    ctx: &DispatchCtx,
    command: Command,
    command_id: Option<String>,
) -> Option<Value> {
    match command {
        Command::Refresh => {
            let metrics = {
                let mut net = agent.net.lock().await;
                telemetry::snapshot(
                    &agent.config.version,
                    &agent.hostname,
                    &agent.platform,
                    &agent.local_ip,
                    &mut net,
                )
                .await
            };
            Some(serde_json::to_value(metrics).unwrap_or_default())
        }

        Command::ListFiles { path } => Some(fs::list_files(&path).await),
        Command::Delete { path } => Some(fs::delete_path(&path).await),
        Command::CreateFolder { path } => Some(fs::create_folder(&path).await),
        Command::RenamePath { old, new } => Some(fs::rename_path(&old, &new).await),

        Command::DownloadFileChunked { chunk_size, path } => {
            download::spawn(
                Arc::clone(&agent.downloads),
                ctx.outbound.clone(),
                ctx.jobs.clone(),
                path,
                chunk_size,
            );
            None
        }
        Command::CancelDownload { path } => {
            agent.downloads.cancel_path(&path).await;
            None
        }

        Command::UploadFileStart { path, size } => agent.upload.start(&path, size).await,
        Command::UploadFileChunk { data } => agent.upload.chunk(&data).await,
        Command::UploadFileEnd { hash } => Some(agent.upload.finish(hash.as_deref()).await),
        Command::CancelUpload { path } => agent.upload.cancel(&path).await,

        Command::ScreenshotSettings { patch } => {
            let updated = {
                let mut settings = agent.settings.write().await;
                settings.screenshot.merge(&patch);
                settings.screenshot.clone()
            };
            agent.save_settings().await;
            Some(json!({ "screenshot_settings_updated": updated }))
        }
        Command::GetScreenshotSettings => {
            let screenshot = agent.settings.read().await.screenshot.clone();
            Some(json!({ "screenshot_settings": screenshot }))
        }
        Command::ApplySettings { patch } => Some(apply_settings(agent, &patch).await),
        Command::GetSettings => {
            Some(json!({ "client_settings": agent.settings.read().await.public_json() }))
        }

        Command::GetFullSystemInfo => {
            spawn_response(ctx, command_id, async move {
                Some(json!({ "full_system_info": sysinfo::full_system_info().await }))
            });
            None
        }

        Command::Apt(apt_command) => run_apt(ctx, apt_command, command_id).await,
        Command::Interactive(op) => run_interactive(agent, ctx, op).await,

        Command::InstallPackage { path } => package::install_package(&ctx.outbound, &path).await,
        Command::Shutdown => Some(package::shutdown()),
        Command::Reboot => Some(package::reboot()),

        Command::ScreenshotQuality { quality } => {
            spawn_capture(agent, ctx, command_id, Some(quality));
            None
        }
        Command::Screenshot => {
            spawn_capture(agent, ctx, command_id, None);
            None
        }

        Command::Execute { line } => {
            let agent = Arc::clone(agent);
            spawn_response(ctx, command_id, async move {
                Some(exec::execute(&agent.cwd, &line).await)
            });
            None
        }
        Command::ShowMessage { text } => {
            spawn_response(ctx, command_id, async move { Some(notify::show_message(&text).await) });
            None
        }

        Command::Unknown(raw) => {
            error!(command = %raw, "unknown command from server");
            Some(json!({ "error": format!("❓ Unknown command: {raw}") }))
        }
    }
}

async fn run_apt(
    ctx: &DispatchCtx,
    command: AptCommand,
    command_id: Option<String>,
) -> Option<Value> {
    match command {
        AptCommand::GetRepos => Some(apt::get_repos().await),
        AptCommand::SaveRepo { path, content_b64 } => {
            Some(apt::save_repo(&path, &content_b64).await)
        }
        AptCommand::Update => {
            apt::spawn_streamed(ctx.outbound.clone(), ctx.jobs.clone(), "sudo apt-get update".to_owned());
            None
        }
        AptCommand::ListUpgradable => {
            spawn_response(ctx, command_id, async move { Some(apt::list_upgradable().await) });
            None
        }
        AptCommand::UpgradePackages { names } => {
            let packages = apt::sanitize_packages(&names);
            if !packages.is_empty() {
                apt::spawn_streamed(
                    ctx.outbound.clone(),
                    ctx.jobs.clone(),
                    format!("sudo apt-get install --only-upgrade -y {packages}"),
                );
            }
            None
        }
        AptCommand::FullUpgrade => {
            apt::spawn_streamed(
                ctx.outbound.clone(),
                ctx.jobs.clone(),
                "sudo apt update && sudo apt-get dist-upgrade".to_owned(),
            );
            None
        }
        AptCommand::Unknown(raw) => {
            Some(json!({ "error": format!("❓ Unknown command: apt:{raw}") }))
        }
    }
}

async fn run_interactive(
    agent: &Arc<Agent>,
    ctx: &DispatchCtx,
    op: InteractiveCommand,
) -> Option<Value> {
    match op {
        InteractiveCommand::Start { command } => {
            Some(crate::shell::start(&agent.shell, &command, &ctx.outbound).await)
        }
        InteractiveCommand::Input { data } => agent.shell.input(&data, &ctx.outbound).await,
        InteractiveCommand::Stop => Some(agent.shell.stop(&ctx.outbound).await),
        InteractiveCommand::Resize { rows, cols } => agent.shell.resize(rows, cols).await,
        InteractiveCommand::Unknown(action) => {
            Some(json!({ "interactive_error": format!("Unknown interactive action: {action}") }))
        }
    }
}

/// `apply_settings:<json>`: merge (client_id immune), re-clamp, persist.
async fn apply_settings(agent: &Arc<Agent>, patch: &Value) -> Value {
    let updated = {
        let mut settings = agent.settings.write().await;
        settings.merge(patch);
        settings.clone()
    };
    agent.save_settings().await;
    json!({ "settings_applied": "success", "new_settings": updated.public_json() })
}

/// Run a long handler off the session loop; it delivers its own response
/// unless the connection's job token fires first.
fn spawn_response<F>(ctx: &DispatchCtx, command_id: Option<String>, handler: F)
where
    F: std::future::Future<Output = Option<Value>> + Send + 'static,
{
    let outbound = ctx.outbound.clone();
    let jobs = ctx.jobs.clone();
    tokio::spawn(async move {
        let response = tokio::select! {
            _ = jobs.cancelled() => None,
            response = handler => response,
        };
        if let Some(response) = response {
            let response = wire::attach_command_id(response, command_id.as_deref());
            let _ = outbound.send_json(&response).await;
        }
    });
}

fn spawn_capture(
    agent: &Arc<Agent>,
    ctx: &DispatchCtx,
    command_id: Option<String>,
    force_quality: Option<u8>,
) {
    let agent = Arc::clone(agent);
    spawn_response(ctx, command_id, async move {
        let shot = agent.settings.read().await.screenshot.clone();
        let quality = force_quality.unwrap_or(shot.quality);
        Some(screenshot::capture_response(agent.capture.as_ref(), quality, shot.monitor_mode).await)
    });
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
