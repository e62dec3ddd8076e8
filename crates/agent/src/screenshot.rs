// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Screen capture behind a pluggable backend.
//!
//! The core only needs "quality + monitor mode in, encoded image out";
//! the shipped backend shells out to whichever X11 capture tool the host
//! has. Platforms without a usable backend simply answer every capture
//! with an error envelope.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::bail;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use crate::desktop::{self, GraphicalSession};
use crate::settings::MonitorMode;
use crate::state::Agent;
use crate::transport::Outbound;
use crate::wire;

/// A captured frame.
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<u8>,
    pub mime: &'static str,
}

/// Capture backends produce an encoded image for a quality/monitor-mode
/// pair. Object-safe so the agent carries `Arc<dyn CaptureBackend>`.
pub trait CaptureBackend: Send + Sync + 'static {
    fn capture(
        &self,
        quality: u8,
        mode: MonitorMode,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Capture>> + Send + '_>>;
}

/// X11 backend: ImageMagick `import` first, then `scrot`, then
/// `gnome-screenshot`, run inside the active graphical session.
pub struct X11Capture;

#[derive(Debug, Clone, Copy)]
enum Method {
    Import,
    Scrot,
    GnomeScreenshot,
}

impl CaptureBackend for X11Capture {
    fn capture(
        &self,
        quality: u8,
        _mode: MonitorMode,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Capture>> + Send + '_>> {
        Box::pin(async move {
            let Some(session) = desktop::graphical_sessions().await.into_iter().next() else {
                bail!("❌ Не найдено активной графической сессии");
            };

            // Let root clients reach the display; harmless when already allowed.
            let _ = desktop::run_as_user(
                &session,
                &["xhost", "+SI:localuser:root"],
                None,
                Duration::from_secs(5),
            )
            .await;

            for method in [Method::Import, Method::Scrot, Method::GnomeScreenshot] {
                match try_method(&session, method, quality).await {
                    Ok(capture) => return Ok(capture),
                    Err(e) => debug!(?method, err = %e, "capture method failed"),
                }
            }
            bail!("❌ Все методы создания скриншота не удались")
        })
    }
}

async fn try_method(
    session: &GraphicalSession,
    method: Method,
    quality: u8,
) -> anyhow::Result<Capture> {
    let cmd: &[&str] = match method {
        Method::Import => &["import", "-window", "root", "png:-"],
        Method::Scrot => &["scrot", "-o", "-"],
        Method::GnomeScreenshot => &["gnome-screenshot", "-f", "-", "--include-pointer"],
    };
    if desktop::which(cmd[0]).is_none() {
        bail!("{} not installed", cmd[0]);
    }

    let output = desktop::run_as_user(session, cmd, None, Duration::from_secs(15)).await?;
    if !output.status.success() || output.stdout.is_empty() {
        bail!("{} exited with {}", cmd[0], output.status);
    }
    let png = output.stdout;

    // Below full quality, recompress to JPEG when ImageMagick is present.
    if quality < 100 && desktop::which("convert").is_some() {
        let q = quality.to_string();
        let convert = ["convert", "png:-", "-quality", q.as_str(), "jpg:-"];
        if let Ok(converted) =
            desktop::run_as_user(session, &convert, Some(&png), Duration::from_secs(10)).await
        {
            if converted.status.success() && !converted.stdout.is_empty() {
                return Ok(Capture { data: converted.stdout, mime: "image/jpeg" });
            }
        }
    }
    Ok(Capture { data: png, mime: "image/png" })
}

/// The screenshot payload shared by the one-shot and streaming paths.
pub fn envelope(capture: &Capture, quality: u8) -> Value {
    json!({
        "screenshot": STANDARD.encode(&capture.data),
        "quality": quality,
        "timestamp": wire::timestamp(),
    })
}

/// On-demand capture: a screenshot envelope or an error envelope.
pub async fn capture_response(backend: &dyn CaptureBackend, quality: u8, mode: MonitorMode) -> Value {
    match backend.capture(quality, mode).await {
        Ok(capture) => envelope(&capture, quality),
        Err(e) => json!({ "error": format!("❌ Ошибка создания скриншота: {e}") }),
    }
}

/// Streaming capture: wrap in `screenshot_update` and send. Errors are
/// logged and the stream just skips a frame.
pub async fn stream_capture(agent: &Agent, outbound: &Outbound, quality: u8, mode: MonitorMode) {
    match agent.capture.capture(quality, mode).await {
        Ok(capture) => {
            let frame = json!({
                "screenshot_update": envelope(&capture, quality),
                "timestamp": wire::timestamp(),
            });
            let _ = outbound.send_json(&frame).await;
        }
        Err(e) => debug!(err = %e, "streaming capture failed"),
    }
}
