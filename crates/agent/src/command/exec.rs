// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `execute` verb: one-shot shell commands in a per-agent working
//! directory. `cd` never reaches the shell: it moves the agent's own
//! cwd and echoes the new prompt.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::RwLock;

/// Hard cap on one-shot command runtime.
const EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Run one `execute` line against the shared cwd.
pub async fn execute(cwd: &RwLock<PathBuf>, line: &str) -> Value {
    let line = line.trim();
    if line == "cd" || line.starts_with("cd ") {
        let target = line.strip_prefix("cd").unwrap_or("").trim();
        return change_dir(cwd, target).await;
    }
    run_shell(cwd, line).await
}

async fn change_dir(cwd: &RwLock<PathBuf>, target: &str) -> Value {
    let target = if target.is_empty() { "~" } else { target };
    let expanded = expand_home(target);
    let absolute =
        if expanded.is_absolute() { expanded } else { cwd.read().await.join(expanded) };
    let normalized = normalize(&absolute);

    if tokio::fs::metadata(&normalized).await.map(|meta| meta.is_dir()).unwrap_or(false) {
        let display = normalized.to_string_lossy().into_owned();
        *cwd.write().await = normalized;
        json!({ "prompt_update": display })
    } else {
        json!({ "command_error": format!("❌ cd: no such file or directory: {target}") })
    }
}

async fn run_shell(cwd: &RwLock<PathBuf>, line: &str) -> Value {
    let dir = cwd.read().await.clone();
    let mut command = tokio::process::Command::new("sh");
    command
        .arg("-c")
        .arg(line)
        .current_dir(&dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(EXEC_TIMEOUT, command.output()).await {
        Err(_) => json!({ "command_error": "⌛ Timeout expired" }),
        Ok(Err(e)) => json!({ "command_error": e.to_string() }),
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if output.status.success() {
                json!({ "command_result": stdout })
            } else {
                json!({ "command_error": format!("{stdout}{stderr}") })
            }
        }
    }
}

/// Lexically normalize a path: resolve `.` and `..` without touching the
/// filesystem (so the result is deterministic even for missing paths).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` above the root stays at the root; above a relative
                // start it is preserved.
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// `~` / `~/…` expansion against `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return home_dir();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home_dir().join(rest);
    }
    PathBuf::from(path)
}

/// `$HOME`, falling back to `/`.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/"))
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
