// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent → server chunked download jobs.
//!
//! Each request spawns an independent producer task that emits a start
//! frame, ⌈N/c⌉ chunk frames in file order, and an end frame. Jobs
//! interleave freely at frame boundaries because every frame goes through
//! the serialized outbound channel. Cancellation is best-effort: a
//! cancelled job stops producing frames without an explicit end.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::Outbound;

/// Chunk size when the request does not carry one.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

struct Job {
    path: String,
    cancel: CancellationToken,
}

/// Registry of live download jobs, for best-effort cancellation by path.
#[derive(Default)]
pub struct Downloads {
    jobs: Mutex<HashMap<u64, Job>>,
    next_id: AtomicU64,
}

impl Downloads {
    async fn register(&self, path: &str, parent: &CancellationToken) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = parent.child_token();
        self.jobs.lock().await.insert(id, Job { path: path.to_owned(), cancel: cancel.clone() });
        (id, cancel)
    }

    async fn deregister(&self, id: u64) {
        self.jobs.lock().await.remove(&id);
    }

    /// `cancel_download:<path>`: cancel every live job streaming `path`.
    pub async fn cancel_path(&self, path: &str) {
        let jobs = self.jobs.lock().await;
        let mut matched = false;
        for job in jobs.values() {
            if job.path == path {
                job.cancel.cancel();
                matched = true;
            }
        }
        if matched {
            info!(path, "download cancelled");
        } else {
            warn!(path, "cancel requested but no matching download is active");
        }
    }

    /// Disconnect cleanup. The tasks themselves die on their next send or
    /// via the connection's job token; only the bookkeeping is dropped.
    pub async fn clear(&self) {
        self.jobs.lock().await.clear();
    }
}

/// Spawn a download job for `path` with the given chunk size.
pub fn spawn(
    downloads: Arc<Downloads>,
    outbound: Outbound,
    session_cancel: CancellationToken,
    path: String,
    chunk_size: usize,
) {
    tokio::spawn(async move {
        let (id, cancel) = downloads.register(&path, &session_cancel).await;
        if let Err(e) = run(&outbound, &cancel, &path, chunk_size.max(1)).await {
            debug!(path, err = %e, "download job ended early");
            let frame = json!({ "error": format!("❌ Ошибка при отправке файла: {e}") });
            let _ = outbound.send_json(&frame).await;
        }
        downloads.deregister(id).await;
    });
}

async fn run(
    outbound: &Outbound,
    cancel: &CancellationToken,
    path: &str,
    chunk_size: usize,
) -> anyhow::Result<()> {
    let size = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => {
            let frame =
                json!({ "error": format!("❌ Файл не найден или является директорией: {path}") });
            outbound.send_json(&frame).await?;
            return Ok(());
        }
    };

    let filename = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_owned());

    let mut file = tokio::fs::File::open(path).await?;

    outbound
        .send_json(&json!({
            "download_file_start": { "filename": filename, "filesize": size, "path": path }
        }))
        .await?;

    let mut remaining = size;
    while remaining > 0 {
        if cancel.is_cancelled() {
            debug!(path, remaining, "download aborted");
            return Ok(());
        }
        let take = remaining.min(chunk_size as u64) as usize;
        let mut buf = vec![0u8; take];
        file.read_exact(&mut buf).await?;
        remaining -= take as u64;

        // Encode on the blocking pool; chunks can be megabytes.
        let encoded = tokio::task::spawn_blocking(move || STANDARD.encode(&buf)).await?;
        outbound
            .send_json(&json!({
                "download_file_chunk": { "data": encoded, "path": path }
            }))
            .await?;
    }

    outbound.send_json(&json!({ "download_file_end": { "path": path } })).await?;
    info!(path, size, "download finished");
    Ok(())
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;
