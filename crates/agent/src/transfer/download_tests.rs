// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::transport::Outbound;

use super::{spawn, Downloads};

fn outbound_pair() -> (Outbound, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(256);
    (Outbound::new(tx), rx)
}

async fn collect_frames(rx: &mut mpsc::Receiver<String>, count: usize) -> Vec<Value> {
    let mut frames = Vec::new();
    while frames.len() < count {
        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("outbound channel closed early");
        frames.push(serde_json::from_str(&frame).expect("frame is not JSON"));
    }
    frames
}

#[tokio::test]
async fn nine_bytes_with_chunk_four_emits_three_chunks_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("y.bin");
    std::fs::write(&path, b"ABCDEFGHI").unwrap();
    let path = path.to_string_lossy().into_owned();

    let (outbound, mut rx) = outbound_pair();
    let downloads = Arc::new(Downloads::default());
    spawn(downloads, outbound, CancellationToken::new(), path.clone(), 4);

    let frames = collect_frames(&mut rx, 5).await;

    let start = &frames[0]["download_file_start"];
    assert_eq!(start["filename"], "y.bin");
    assert_eq!(start["filesize"], 9);
    assert_eq!(start["path"], path.as_str());

    let expected = [
        STANDARD.encode("ABCD"),
        STANDARD.encode("EFGH"),
        STANDARD.encode("I"),
    ];
    for (frame, chunk) in frames[1..4].iter().zip(expected.iter()) {
        assert_eq!(frame["download_file_chunk"]["data"], chunk.as_str());
        assert_eq!(frame["download_file_chunk"]["path"], path.as_str());
    }

    assert_eq!(frames[4]["download_file_end"]["path"], path.as_str());
}

#[tokio::test]
async fn exact_multiple_has_no_trailing_short_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("even.bin");
    std::fs::write(&path, b"ABCDEFGH").unwrap();
    let path = path.to_string_lossy().into_owned();

    let (outbound, mut rx) = outbound_pair();
    spawn(Arc::new(Downloads::default()), outbound, CancellationToken::new(), path, 4);

    let frames = collect_frames(&mut rx, 4).await;
    assert!(frames[0].get("download_file_start").is_some());
    assert_eq!(frames[1]["download_file_chunk"]["data"], STANDARD.encode("ABCD"));
    assert_eq!(frames[2]["download_file_chunk"]["data"], STANDARD.encode("EFGH"));
    assert!(frames[3].get("download_file_end").is_some());
}

#[tokio::test]
async fn empty_file_sends_start_then_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.bin");
    std::fs::write(&path, b"").unwrap();
    let path = path.to_string_lossy().into_owned();

    let (outbound, mut rx) = outbound_pair();
    spawn(Arc::new(Downloads::default()), outbound, CancellationToken::new(), path, 4);

    let frames = collect_frames(&mut rx, 2).await;
    assert_eq!(frames[0]["download_file_start"]["filesize"], 0);
    assert!(frames[1].get("download_file_end").is_some());
}

#[tokio::test]
async fn missing_file_reports_error_frame() {
    let (outbound, mut rx) = outbound_pair();
    spawn(
        Arc::new(Downloads::default()),
        outbound,
        CancellationToken::new(),
        "/no/such/file.bin".to_owned(),
        4,
    );

    let frames = collect_frames(&mut rx, 1).await;
    assert!(frames[0]["error"].as_str().unwrap().contains("/no/such/file.bin"));
}

#[tokio::test]
async fn directory_reports_error_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_string_lossy().into_owned();
    let (outbound, mut rx) = outbound_pair();
    spawn(Arc::new(Downloads::default()), outbound, CancellationToken::new(), path, 4);

    let frames = collect_frames(&mut rx, 1).await;
    assert!(frames[0].get("error").is_some());
}

#[tokio::test]
async fn cancelled_job_stops_producing_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.bin");
    std::fs::write(&path, vec![0u8; 64 * 1024]).unwrap();
    let path = path.to_string_lossy().into_owned();

    let (outbound, mut rx) = outbound_pair();
    let downloads = Arc::new(Downloads::default());
    // Cancel through the session token before the job starts reading.
    let session_cancel = CancellationToken::new();
    session_cancel.cancel();
    spawn(Arc::clone(&downloads), outbound, session_cancel, path, 1024);

    // Start frame may arrive; chunk frames must not.
    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
    if let Some(frame) = first {
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert!(value.get("download_file_chunk").is_none());
    }
    match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
        Err(_) | Ok(None) => {}
        Ok(Some(frame)) => panic!("job kept producing after cancel: {frame}"),
    }
}
