// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive shell: one PTY-backed session multiplexed over the same
//! channel as commands.
//!
//! The slot owns at most one session. Every teardown path detaches the
//! session from the slot before touching it, so a replacement `start`,
//! an explicit `stop`, a disconnect, and the reader's own exit can never
//! double-clean or race on the fd.

pub mod pty;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nix::sys::signal::{kill, Signal};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::Outbound;

use self::pty::Master;

/// Bytes read from the master per iteration of the reader loop.
const READ_CHUNK: usize = 1024;

/// Initial window size; the server follows up with `interactive:resize`.
const INITIAL_COLS: u16 = 80;
const INITIAL_ROWS: u16 = 24;

struct ShellSession {
    id: u64,
    pid: nix::unistd::Pid,
    master: Arc<Master>,
    reader: JoinHandle<()>,
}

/// Single-owner slot for the interactive session.
#[derive(Default)]
pub struct ShellSlot {
    current: Mutex<Option<ShellSession>>,
    next_id: AtomicU64,
}

/// `interactive:start:<cmd>`: spawn a PTY session, replacing (and first
/// cleaning up) any existing one.
pub async fn start(slot: &Arc<ShellSlot>, command: &str, outbound: &Outbound) -> Value {
    if slot.current.lock().await.is_some() {
        warn!("interactive session already running, replacing it");
        slot.cleanup(Some(outbound)).await;
    }

    let child = match pty::spawn(command, INITIAL_COLS, INITIAL_ROWS) {
        Ok(child) => child,
        Err(e) => return json!({ "interactive_error": format!("Failed to start session: {e}") }),
    };

    info!(pid = child.pid.as_raw(), command, "interactive session started");
    let id = slot.next_id.fetch_add(1, Ordering::Relaxed);
    let master = Arc::new(child.master);

    // Install under the lock: the reader's own cleanup blocks on the slot,
    // so even an instantly-exiting child cannot race the installation.
    let mut guard = slot.current.lock().await;
    let reader =
        tokio::spawn(read_loop(Arc::clone(slot), id, Arc::clone(&master), outbound.clone()));
    *guard = Some(ShellSession { id, pid: child.pid, master, reader });
    json!({ "interactive_started": true })
}

impl ShellSlot {
    /// `interactive:input:<bytes>`: write raw bytes to the master side.
    /// A broken pipe tears the session down.
    pub async fn input(&self, data: &str, outbound: &Outbound) -> Option<Value> {
        let master = {
            let guard = self.current.lock().await;
            match guard.as_ref() {
                Some(session) => Arc::clone(&session.master),
                None => {
                    return Some(
                        json!({ "interactive_error": "No interactive session is running." }),
                    )
                }
            }
        };
        if let Err(e) = master.write_input(data.as_bytes()).await {
            debug!(err = %e, "interactive input write failed, cleaning up");
            self.cleanup(Some(outbound)).await;
        }
        None
    }

    /// `interactive:stop`: tear the session down.
    pub async fn stop(&self, outbound: &Outbound) -> Value {
        if self.current.lock().await.is_none() {
            return json!({ "interactive_error": "No interactive session is running." });
        }
        self.cleanup(Some(outbound)).await;
        json!({ "interactive_stopped": true })
    }

    /// `interactive:resize:<rows>,<cols>`: set the PTY window size.
    pub async fn resize(&self, rows: u16, cols: u16) -> Option<Value> {
        let guard = self.current.lock().await;
        let Some(session) = guard.as_ref() else {
            return Some(json!({ "interactive_error": "No interactive session is running." }));
        };
        if let Err(e) = session.master.set_winsize(rows, cols) {
            return Some(json!({ "interactive_error": format!("Resize failed: {e}") }));
        }
        None
    }

    /// Detach and tear down whatever session is current.
    pub async fn cleanup(&self, outbound: Option<&Outbound>) {
        let session = self.current.lock().await.take();
        if let Some(session) = session {
            teardown(session, outbound).await;
        }
    }

    /// Tear down only if the slot still holds the session the reader was
    /// spawned for; a replacement session is left untouched.
    async fn cleanup_if(&self, id: u64, outbound: Option<&Outbound>) {
        let session = {
            let mut guard = self.current.lock().await;
            match guard.as_ref() {
                Some(current) if current.id == id => guard.take(),
                _ => None,
            }
        };
        if let Some(session) = session {
            teardown(session, outbound).await;
        }
    }
}

/// SIGTERM the child, notify the server, stop the reader. The session is
/// already detached from the slot, so nothing else can observe it.
async fn teardown(session: ShellSession, outbound: Option<&Outbound>) {
    if let Err(e) = kill(session.pid, Signal::SIGTERM) {
        debug!(pid = session.pid.as_raw(), err = %e, "interactive child already gone");
    }
    if let Some(outbound) = outbound {
        // Best-effort: the transport may already be down.
        let _ = outbound.send_json(&json!({ "interactive_stopped": true })).await;
    }
    session.reader.abort();
    info!(pid = session.pid.as_raw(), "interactive session stopped");
    // Dropping the session releases the slot's master handle; the fd
    // closes once the reader task is gone too.
}

/// Reader task: forward PTY output until EOF or error, then clean up.
async fn read_loop(slot: Arc<ShellSlot>, id: u64, master: Arc<Master>, outbound: Outbound) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match master.read_output(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let data = String::from_utf8_lossy(&buf[..n]).into_owned();
                let frame = json!({ "interactive_output": { "data": data } });
                if outbound.send_json(&frame).await.is_err() {
                    break;
                }
            }
            // EIO is the normal "child exited" signal on a PTY master.
            Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => break,
            Err(e) => {
                debug!(err = %e, "interactive read failed");
                break;
            }
        }
    }
    slot.cleanup_if(id, Some(&outbound)).await;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
