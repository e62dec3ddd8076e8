// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reaching into active graphical user sessions.
//!
//! The agent runs as a system service; anything that touches the desktop
//! (screenshots, notifications) is executed as the session owner via
//! `runuser` with the session's DISPLAY and user bus wired up.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// One active local X session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicalSession {
    pub user: String,
    pub display: String,
    pub uid: u32,
}

/// Locate an executable on `PATH`.
pub fn which(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).map(|dir| dir.join(name)).find(|candidate| candidate.is_file())
}

/// Parse `who` output for sessions attached to a local display: lines
/// whose last field is `(:N)`. Returns (user, display) pairs, one per
/// display.
pub fn parse_who(output: &str) -> Vec<(String, String)> {
    let mut sessions: Vec<(String, String)> = Vec::new();
    for line in output.lines() {
        let Some(user) = line.split_whitespace().next() else { continue };
        let Some(last) = line.split_whitespace().last() else { continue };
        let display = last.trim_start_matches('(').trim_end_matches(')');
        if display.starts_with(':') && !sessions.iter().any(|(_, d)| d == display) {
            sessions.push((user.to_owned(), display.to_owned()));
        }
    }
    sessions
}

/// Active graphical sessions with resolved uids.
pub async fn graphical_sessions() -> Vec<GraphicalSession> {
    let output = match Command::new("who").output().await {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };
    let mut sessions = Vec::new();
    for (user, display) in parse_who(&String::from_utf8_lossy(&output.stdout)) {
        let Some(uid) = resolve_uid(&user).await else { continue };
        sessions.push(GraphicalSession { user, display, uid });
    }
    sessions
}

async fn resolve_uid(user: &str) -> Option<u32> {
    let output = Command::new("id").arg("-u").arg(user).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

/// Run `cmd` as the session owner with the session environment, feeding
/// optional stdin, bounded by `timeout`.
pub async fn run_as_user(
    session: &GraphicalSession,
    cmd: &[&str],
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> anyhow::Result<std::process::Output> {
    let mut command = Command::new("runuser");
    command
        .arg("-u")
        .arg(&session.user)
        .arg("--")
        .args(cmd)
        .env("DISPLAY", &session.display)
        .env("XDG_RUNTIME_DIR", format!("/run/user/{}", session.uid))
        .env("DBUS_SESSION_BUS_ADDRESS", format!("unix:path=/run/user/{}/bus", session.uid))
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().context("spawn runuser")?;
    if let Some(data) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let _ = pipe.write_all(data).await;
            // pipe drops here, closing the child's stdin
        }
    }
    tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .context("session command timed out")?
        .context("session command failed")
}

#[cfg(test)]
#[path = "desktop_tests.rs"]
mod tests;
