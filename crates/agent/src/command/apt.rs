// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! APT operations: repo files, upgrade enumeration, and streamed package
//! commands.
//!
//! Repo writes are restricted to `/etc/apt/sources.list` and files
//! strictly inside `/etc/apt/sources.list.d/`; everything else gets a
//! security error. Long-running apt commands relay their output line by
//! line and finish with an exit-code frame.

use std::path::Path;
use std::process::Stdio;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::exec::normalize;
use crate::transport::Outbound;

const SOURCES_LIST: &str = "/etc/apt/sources.list";
const SOURCES_DIR: &str = "/etc/apt/sources.list.d";

/// `apt:get_repos`: sources.list plus every `*.list` under
/// sources.list.d, keyed by path. Unreadable files carry the error text
/// as their content.
pub async fn get_repos() -> Value {
    let mut repos = Map::new();
    if tokio::fs::try_exists(SOURCES_LIST).await.unwrap_or(false) {
        let content = match tokio::fs::read_to_string(SOURCES_LIST).await {
            Ok(content) => content,
            Err(e) => format!("❌ Error reading file: {e}"),
        };
        repos.insert(SOURCES_LIST.to_owned(), Value::String(content));
    }

    if let Ok(mut dir) = tokio::fs::read_dir(SOURCES_DIR).await {
        let mut paths = Vec::new();
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "list") {
                paths.push(path);
            }
        }
        paths.sort();
        for path in paths {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => format!("❌ Error reading file: {e}"),
            };
            repos.insert(path.to_string_lossy().into_owned(), Value::String(content));
        }
    }
    json!({ "apt_repo_data": repos })
}

/// True when `path` resolves to the writable APT surface: the main
/// sources.list, or a file strictly inside sources.list.d.
pub fn repo_path_allowed(path: &str) -> bool {
    let normalized = normalize(Path::new(path));
    normalized == Path::new(SOURCES_LIST)
        || (normalized.starts_with(SOURCES_DIR) && normalized != Path::new(SOURCES_DIR))
}

/// `apt:save_repo:<path>:<b64>`: write a repo file inside /etc/apt only.
pub async fn save_repo(path: &str, content_b64: &str) -> Value {
    if !repo_path_allowed(path) {
        warn!(path, "repo write outside /etc/apt refused");
        return json!({
            "apt_command_result": "❌ Ошибка безопасности: запись разрешена только в /etc/apt/."
        });
    }
    let decoded = STANDARD
        .decode(content_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    let Some(content) = decoded else {
        return json!({
            "apt_command_result": format!("❌ Ошибка сохранения файла {path}: некорректное содержимое")
        });
    };
    match tokio::fs::write(path, content).await {
        Ok(()) => {
            info!(path, "repo file saved");
            json!({ "apt_command_result": format!("✅ Файл {path} успешно сохранен.") })
        }
        Err(e) => json!({ "apt_command_result": format!("❌ Ошибка сохранения файла {path}: {e}") }),
    }
}

/// `apt:list_upgradable`: run and parse `apt list --upgradable`.
pub async fn list_upgradable() -> Value {
    let output =
        match tokio::process::Command::new("apt").args(["list", "--upgradable"]).output().await {
            Ok(output) => output,
            Err(e) => return json!({ "apt_command_result": format!("❌ Ошибка: {e}") }),
        };
    if !output.status.success() {
        return json!({
            "apt_command_result": format!("❌ Ошибка: {}", String::from_utf8_lossy(&output.stderr))
        });
    }
    json!({ "apt_upgradable_list": parse_upgradable(&String::from_utf8_lossy(&output.stdout)) })
}

/// Parse `name/suite new_version arch [upgradable from: current]` lines;
/// the leading "Listing..." line is skipped.
pub fn parse_upgradable(output: &str) -> Vec<Value> {
    let from_re = Regex::new(r"\[upgradable from:\s*(.*?)\]").ok();
    let mut packages = Vec::new();
    for line in output.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let name = parts[0].split('/').next().unwrap_or(parts[0]);
        let current = from_re
            .as_ref()
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .map_or("N/A", |m| m.as_str());
        packages.push(json!({ "name": name, "current": current, "new": parts[1] }));
    }
    packages
}

/// Collapse server-sent package names to a safe argument string.
pub fn sanitize_packages(raw: &str) -> String {
    match Regex::new(r"[\w.\-:]+") {
        Ok(re) => re.find_iter(raw).map(|m| m.as_str()).collect::<Vec<_>>().join(" "),
        Err(_) => String::new(),
    }
}

/// Spawn a streamed apt command relaying output to the server.
pub fn spawn_streamed(outbound: Outbound, cancel: CancellationToken, command: String) {
    tokio::spawn(async move {
        stream_command(&outbound, &cancel, &command, "apt_command_output", "apt_command_result")
            .await;
    });
}

/// Run `command` through the shell, relay each stdout/stderr line as a
/// frame under `message_key`, then send a terminal frame under
/// `result_key` with the exit code.
pub async fn stream_command(
    outbound: &Outbound,
    cancel: &CancellationToken,
    command: &str,
    message_key: &str,
    result_key: &str,
) {
    info!(command, "streaming command started");
    let spawned = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            let message = format!("❌ Критическая ошибка выполнения команды: {e}");
            let _ = outbound.send_json(&result_frame(result_key, &message, command)).await;
            return;
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let finished = {
        let wait = async {
            tokio::join!(
                stream_pipe(outbound, message_key, stdout),
                stream_pipe(outbound, message_key, stderr),
            );
            child.wait().await
        };
        tokio::select! {
            _ = cancel.cancelled() => None,
            status = wait => Some(status),
        }
    };

    let status = match finished {
        Some(status) => status,
        None => {
            let _ = child.kill().await;
            info!(command, "streaming command cancelled");
            return;
        }
    };

    let message = match status {
        Ok(status) => format!("✅ Команда завершена с кодом: {}", status.code().unwrap_or(-1)),
        Err(e) => format!("❌ Критическая ошибка выполнения команды: {e}"),
    };
    let _ = outbound.send_json(&result_frame(result_key, &message, command)).await;
}

async fn stream_pipe<R>(outbound: &Outbound, message_key: &str, pipe: Option<R>)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else { return };
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut frame = Map::new();
        frame.insert(message_key.to_owned(), Value::String(format!("{line}\n")));
        if outbound.send_json(&Value::Object(frame)).await.is_err() {
            break;
        }
    }
}

fn result_frame(result_key: &str, message: &str, command: &str) -> Value {
    let mut frame = Map::new();
    frame.insert(result_key.to_owned(), Value::String(message.to_owned()));
    frame.insert("original_command".to_owned(), Value::String(command.to_owned()));
    Value::Object(frame)
}

#[cfg(test)]
#[path = "apt_tests.rs"]
mod tests;
