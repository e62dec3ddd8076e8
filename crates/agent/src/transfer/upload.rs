// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server → agent chunked upload with size and SHA-256 verification.
//!
//! At most one upload exists per session. Chunks arrive serially from the
//! session loop, so the context needs no finer-grained locking than the
//! slot mutex. Any failure or mismatch deletes the partial file; a
//! verified upload of N bytes leaves exactly N bytes on disk.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// In-flight upload state.
pub struct UploadContext {
    file: File,
    path: PathBuf,
    expected_size: u64,
    received_size: u64,
    hasher: Sha256,
}

/// Single-owner slot for the active upload.
#[derive(Default)]
pub struct UploadSlot {
    current: Mutex<Option<UploadContext>>,
}

impl UploadSlot {
    /// `upload_file_start:<path>:<size>`: create the target file (and
    /// parent directories) and install a fresh context, replacing any
    /// stale one.
    pub async fn start(&self, path: &str, expected_size: u64) -> Option<Value> {
        let target = PathBuf::from(path);
        let opened: std::io::Result<File> = async {
            if let Some(parent) = target.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            File::create(&target).await
        }
        .await;

        match opened {
            Ok(file) => {
                info!(path, expected_size, "upload started");
                *self.current.lock().await = Some(UploadContext {
                    file,
                    path: target,
                    expected_size,
                    received_size: 0,
                    hasher: Sha256::new(),
                });
                None
            }
            Err(e) => {
                *self.current.lock().await = None;
                Some(json!({
                    "file_upload_result": "error",
                    "error": format!("❌ Failed to start upload: {e}"),
                }))
            }
        }
    }

    /// `upload_file_chunk:<base64>`: decode, append, update the hash.
    /// A decode or write failure drops the context (the handle closes).
    pub async fn chunk(&self, data: &str) -> Option<Value> {
        let mut guard = self.current.lock().await;
        let Some(ctx) = guard.as_mut() else {
            return Some(json!({ "file_upload_result": "error", "error": "❌ Upload not initiated" }));
        };

        let appended: std::io::Result<()> = async {
            let bytes = STANDARD
                .decode(data)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            ctx.file.write_all(&bytes).await?;
            ctx.hasher.update(&bytes);
            ctx.received_size += bytes.len() as u64;
            Ok(())
        }
        .await;

        match appended {
            Ok(()) => None,
            Err(e) => {
                *guard = None;
                Some(json!({
                    "file_upload_result": "error",
                    "error": format!("❌ Error writing chunk: {e}"),
                }))
            }
        }
    }

    /// `upload_file_end[:<hex sha256>]`: close the handle, verify size
    /// and (when supplied) hash. On any mismatch the file is deleted.
    pub async fn finish(&self, expected_hash: Option<&str>) -> Value {
        let Some(ctx) = self.current.lock().await.take() else {
            return json!({ "file_upload_result": "error", "error": "❌ Upload not initiated" });
        };
        let UploadContext { mut file, path, expected_size, received_size, hasher } = ctx;
        let _ = file.flush().await;
        drop(file);

        if received_size != expected_size {
            let _ = tokio::fs::remove_file(&path).await;
            return json!({
                "file_upload_result": "error",
                "error": format!("❌ File size mismatch. Expected {expected_size}, got {received_size}"),
            });
        }

        if let Some(expected) = expected_hash {
            let actual = format!("{:x}", hasher.finalize());
            if !expected.eq_ignore_ascii_case(&actual) {
                let _ = tokio::fs::remove_file(&path).await;
                return json!({
                    "file_upload_result": "error",
                    "error": "❌ File hash mismatch after upload",
                });
            }
        }

        info!(path = %path.display(), received_size, "upload finished");
        json!({ "file_upload_result": "success" })
    }

    /// `cancel_upload:<path>`: when the path matches the live upload,
    /// close the handle and delete the partial file.
    pub async fn cancel(&self, path: &str) -> Option<Value> {
        let taken = {
            let mut guard = self.current.lock().await;
            match guard.as_ref() {
                Some(ctx) if ctx.path == Path::new(path) => guard.take(),
                _ => None,
            }
        };
        match taken {
            Some(ctx) => {
                let UploadContext { file, path, .. } = ctx;
                drop(file);
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => info!(path = %path.display(), "upload cancelled, partial file removed"),
                    Err(e) => {
                        warn!(path = %path.display(), err = %e, "failed to remove partial file")
                    }
                }
            }
            None => warn!(path, "cancel requested but no matching upload is active"),
        }
        None
    }

    /// Disconnect cleanup: close the handle and delete the partial file.
    pub async fn discard(&self) {
        if let Some(ctx) = self.current.lock().await.take() {
            let UploadContext { file, path, .. } = ctx;
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            info!(path = %path.display(), "in-flight upload discarded");
        }
    }
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
