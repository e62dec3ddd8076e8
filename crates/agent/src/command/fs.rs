// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem verbs: listing, deletion, folder creation, renames.

use serde_json::{json, Value};
use tracing::info;

/// `list_files:<path>`: directory entries as `{name, type, size}`.
pub async fn list_files(path: &str) -> Value {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return json!({ "error": format!("❌ Путь не существует: {path}") });
    }
    let mut dir = match tokio::fs::read_dir(path).await {
        Ok(dir) => dir,
        Err(e) => return json!({ "error": format!("❌ Ошибка чтения директории: {e}") }),
    };

    let mut files = Vec::new();
    while let Ok(Some(entry)) = dir.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        match entry.metadata().await {
            Ok(meta) if meta.is_dir() => {
                files.push(json!({ "name": name, "type": "directory", "size": 0 }));
            }
            Ok(meta) => files.push(json!({ "name": name, "type": "file", "size": meta.len() })),
            Err(_) => files.push(json!({ "name": name, "type": "file", "size": -1 })),
        }
    }
    json!({ "files_list": { "path": path, "files": files } })
}

/// `delete:<path>`: remove a file or a whole directory tree.
pub async fn delete_path(path: &str) -> Value {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(_) => return json!({ "file_delete_result": "error", "error": "❌ Путь не существует" }),
    };
    let removed = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match removed {
        Ok(()) => {
            info!(path, "path deleted");
            json!({ "file_delete_result": "success" })
        }
        Err(e) => json!({ "file_delete_result": "error", "error": format!("❌ {e}") }),
    }
}

/// `create_folder:<path>`: mkdir with parents.
pub async fn create_folder(path: &str) -> Value {
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => json!({ "folder_created": "success" }),
        Err(e) => json!({ "folder_created": "error", "error": format!("❌ {e}") }),
    }
}

/// `rename_path:<old>:<new>`.
pub async fn rename_path(old: &str, new: &str) -> Value {
    match tokio::fs::rename(old, new).await {
        Ok(()) => json!({ "rename_result": "success" }),
        Err(e) => json!({ "rename_result": "error", "error": format!("❌ {e}") }),
    }
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
