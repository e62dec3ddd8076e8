// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use super::{connect, DialError, MAX_FRAME_SIZE};

async fn local_server() -> (TcpListener, String, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr.ip().to_string(), addr.port())
}

#[tokio::test]
async fn refused_connection_is_classified() {
    // Bind a port, then drop the listener so nothing is there.
    let (listener, host, port) = local_server().await;
    drop(listener);
    match connect(&host, port, MAX_FRAME_SIZE).await {
        Err(DialError::Refused) => {}
        other => panic!("expected Refused, got {other:?}", other = other.err()),
    }
}

#[tokio::test]
async fn frames_round_trip_without_interleaving() {
    let (listener, host, port) = local_server().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut tx, mut rx) = ws.split();

        // Collect two whole frames from concurrent senders.
        let mut frames = Vec::new();
        while frames.len() < 2 {
            match rx.next().await {
                Some(Ok(Message::Text(text))) => frames.push(text.to_string()),
                Some(Ok(_)) => {}
                other => panic!("unexpected message: {other:?}"),
            }
        }

        tx.send(Message::Text("{\"command\":\"refresh\"}".into())).await.unwrap();
        frames
    });

    let mut transport = connect(&host, port, MAX_FRAME_SIZE).await.unwrap();

    // Two producers racing on the same outbound handle.
    let a = transport.outbound();
    let b = transport.outbound();
    let payload_a = format!("{{\"tag\":\"a\",\"fill\":\"{}\"}}", "x".repeat(2048));
    let payload_b = format!("{{\"tag\":\"b\",\"fill\":\"{}\"}}", "y".repeat(2048));
    let send_a = tokio::spawn({
        let payload = payload_a.clone();
        async move { a.send(payload).await }
    });
    let send_b = tokio::spawn({
        let payload = payload_b.clone();
        async move { b.send(payload).await }
    });
    send_a.await.unwrap().unwrap();
    send_b.await.unwrap().unwrap();

    let frames = server.await.unwrap();
    assert!(frames.contains(&payload_a), "frame a corrupted or interleaved");
    assert!(frames.contains(&payload_b), "frame b corrupted or interleaved");

    // The frame the server pushed arrives intact on recv().
    let inbound = tokio::time::timeout(Duration::from_secs(5), transport.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inbound, "{\"command\":\"refresh\"}");
}

#[tokio::test]
async fn peer_close_surfaces_as_recv_none() {
    let (listener, host, port) = local_server().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let mut transport = connect(&host, port, MAX_FRAME_SIZE).await.unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(5), transport.recv()).await.unwrap();
    assert!(closed.is_none());
    server.await.unwrap();

    // Sends after close fail, which is how detached jobs notice.
    let outbound = transport.outbound();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(outbound.send("{}".to_owned()).await.is_err());
}
