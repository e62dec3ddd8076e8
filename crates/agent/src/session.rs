// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection state machine: dial → authenticate → serve → reconnect.
//!
//! Authentication is optimistic: the agent sends its auth frame and
//! starts serving; a rejected token surfaces as the server closing the
//! channel. Leaving Active always runs the same teardown, in order:
//! interactive session, in-flight upload, download bookkeeping. Spawned
//! jobs hang off a per-connection token and die with it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::command::{self, DispatchCtx};
use crate::config::{CAPABILITIES, PROTOCOL_VERSION};
use crate::screenshot;
use crate::state::Agent;
use crate::telemetry;
use crate::transport::{self, Outbound, Transport, MAX_FRAME_SIZE};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Dialing,
    Authenticating,
    Active,
    Reconnecting,
    Stopped,
}

/// First frame after connect.
#[derive(Serialize)]
struct AuthFrame<'a> {
    auth_token: &'a str,
    client_id: &'a str,
    protocol_version: u32,
    capabilities: &'a [&'a str],
    client_info: ClientInfo<'a>,
}

#[derive(Serialize)]
struct ClientInfo<'a> {
    hostname: &'a str,
    os_type: &'a str,
    platform_full: &'a str,
    settings: Value,
}

/// Drive the session until `shutdown` fires. The backoff delay doubles
/// per failed attempt, saturates at the configured max, carries uniform
/// jitter, and resets after every successful authentication.
pub async fn run(agent: Arc<Agent>, shutdown: CancellationToken) {
    let mut backoff = {
        let settings = agent.settings.read().await;
        Backoff::new(
            settings.reconnect_delay,
            settings.reconnect_max_delay,
            settings.reconnect_jitter,
        )
    };

    info!(
        host = %agent.config.server_host,
        port = agent.config.server_port,
        hostname = %agent.hostname,
        local_ip = %agent.local_ip,
        "connecting to server"
    );

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        debug!(state = ?SessionState::Dialing, "dialing server");
        let outcome =
            match transport::connect(&agent.config.server_host, agent.config.server_port, MAX_FRAME_SIZE)
                .await
            {
                Ok(mut transport) => {
                    debug!(state = ?SessionState::Authenticating, "connected");
                    let outcome = match authenticate(&agent, &transport).await {
                        Ok(()) => {
                            info!("authenticated");
                            backoff.reset();
                            debug!(state = ?SessionState::Active, "serving");
                            serve(&agent, &mut transport, &shutdown).await
                        }
                        Err(e) => {
                            warn!(err = %e, "authentication send failed");
                            SessionState::Reconnecting
                        }
                    };
                    teardown(&agent, &transport.outbound()).await;
                    outcome
                }
                Err(e) => {
                    warn!(err = %e, "connection failed");
                    SessionState::Reconnecting
                }
            };

        if outcome == SessionState::Stopped || shutdown.is_cancelled() {
            break;
        }

        let delay = backoff.next_delay();
        warn!(delay_ms = delay.as_millis() as u64, "disconnected, retrying after backoff");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => break,
        }
    }
    info!("agent stopped");
}

/// Send the auth envelope: token, stable client id, protocol version,
/// capabilities, and a host summary with the public settings.
async fn authenticate(agent: &Agent, transport: &Transport) -> anyhow::Result<()> {
    let settings = agent.settings.read().await.public_json();
    let frame = AuthFrame {
        auth_token: &agent.config.auth_token,
        client_id: &agent.config.client_id,
        protocol_version: PROTOCOL_VERSION,
        capabilities: &CAPABILITIES,
        client_info: ClientInfo {
            hostname: &agent.hostname,
            os_type: &agent.os_type,
            platform_full: &agent.platform,
            settings,
        },
    };
    transport.outbound().send_json(&frame).await
}

/// Active loop. A 1-second tick paces the telemetry pump and the
/// streaming screenshot; inbound frames are dispatched in arrival order.
async fn serve(
    agent: &Arc<Agent>,
    transport: &mut Transport,
    shutdown: &CancellationToken,
) -> SessionState {
    let ctx = DispatchCtx { outbound: transport.outbound(), jobs: CancellationToken::new() };

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_metrics: Option<Instant> = None;
    let mut last_capture: Option<Instant> = None;
    let mut capture_task: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                ctx.jobs.cancel();
                return SessionState::Stopped;
            }

            frame = transport.recv() => {
                match frame {
                    Some(text) => command::dispatch(agent, &ctx, &text).await,
                    None => {
                        debug!("channel closed");
                        ctx.jobs.cancel();
                        return SessionState::Reconnecting;
                    }
                }
            }

            _ = tick.tick() => {
                let (metrics_every, shot) = {
                    let settings = agent.settings.read().await;
                    (settings.monitoring_interval, settings.screenshot.clone())
                };

                if due(last_metrics, Duration::from_secs(metrics_every)) {
                    let metrics = {
                        let mut net = agent.net.lock().await;
                        telemetry::snapshot(
                            &agent.config.version,
                            &agent.hostname,
                            &agent.platform,
                            &agent.local_ip,
                            &mut net,
                        )
                        .await
                    };
                    if ctx.outbound.send_json(&metrics).await.is_err() {
                        ctx.jobs.cancel();
                        return SessionState::Reconnecting;
                    }
                    last_metrics = Some(Instant::now());
                }

                // Streaming capture: fire only when the previous task is done.
                if shot.enabled
                    && due(last_capture, Duration::from_secs(shot.refresh_delay))
                    && capture_task.as_ref().map_or(true, JoinHandle::is_finished)
                {
                    let agent = Arc::clone(agent);
                    let outbound = ctx.outbound.clone();
                    capture_task = Some(tokio::spawn(async move {
                        screenshot::stream_capture(&agent, &outbound, shot.quality, shot.monitor_mode)
                            .await;
                    }));
                    last_capture = Some(Instant::now());
                }
            }
        }
    }
}

fn due(last: Option<Instant>, every: Duration) -> bool {
    last.map_or(true, |at| at.elapsed() >= every)
}

/// Cleanup on leaving Active, in a fixed order: interactive session
/// first, then the in-flight upload (handle closed, partial file
/// removed), then download bookkeeping.
async fn teardown(agent: &Agent, outbound: &Outbound) {
    debug!("connection teardown");
    agent.shell.cleanup(Some(outbound)).await;
    agent.upload.discard().await;
    agent.downloads.clear().await;
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
