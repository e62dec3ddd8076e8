// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic host metrics.
//!
//! Counters come straight from procfs; disk usage shells out to `df -P /`
//! the way the rest of the inventory does. Network speeds are derived
//! from the previous sample; the agent keeps no further history (that is
//! the server's concern).

use std::time::{Duration, Instant};

use serde::Serialize;

/// One metric frame, emitted as a single JSON object.
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub version: String,
    pub hostname: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub disk_total: u64,
    pub disk_used: u64,
    pub uptime: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub bytes_sent_speed: f64,
    pub bytes_recv_speed: f64,
    pub platform: String,
    pub local_ip: String,
}

/// Last network sample, used to derive transfer rates.
#[derive(Debug, Clone, Copy)]
pub struct NetWatermark {
    pub rx: u64,
    pub tx: u64,
    pub at: Instant,
}

impl NetWatermark {
    pub fn now(rx: u64, tx: u64) -> Self {
        Self { rx, tx, at: Instant::now() }
    }

    /// (rx, tx) rates in bytes/second since this sample; zero when no
    /// time has passed.
    pub fn rates(&self, rx: u64, tx: u64, elapsed: Duration) -> (f64, f64) {
        let dt = elapsed.as_secs_f64();
        if dt <= 0.0 {
            return (0.0, 0.0);
        }
        (rx.saturating_sub(self.rx) as f64 / dt, tx.saturating_sub(self.tx) as f64 / dt)
    }
}

/// Collect a full metric snapshot, advancing the network watermark.
pub async fn snapshot(
    version: &str,
    hostname: &str,
    platform: &str,
    local_ip: &str,
    watermark: &mut NetWatermark,
) -> Metrics {
    let stat = tokio::fs::read_to_string("/proc/stat").await.unwrap_or_default();
    let meminfo = tokio::fs::read_to_string("/proc/meminfo").await.unwrap_or_default();
    let uptime = tokio::fs::read_to_string("/proc/uptime").await.unwrap_or_default();
    let (rx, tx) = network_io().await;
    let (disk_percent, disk_used, disk_total) = disk_usage().await;

    let (rx_rate, tx_rate) = watermark.rates(rx, tx, watermark.at.elapsed());
    *watermark = NetWatermark::now(rx, tx);

    let (memory_percent, _, _) = parse_meminfo(&meminfo);

    Metrics {
        version: version.to_owned(),
        hostname: hostname.to_owned(),
        cpu_percent: round1(parse_cpu_percent(&stat)),
        memory_percent: round1(memory_percent),
        disk_percent: round1(disk_percent),
        disk_total,
        disk_used,
        uptime: boot_time_from_uptime(&uptime),
        bytes_sent: tx,
        bytes_recv: rx,
        bytes_sent_speed: tx_rate,
        bytes_recv_speed: rx_rate,
        platform: platform.to_owned(),
        local_ip: local_ip.to_owned(),
    }
}

/// Cumulative (rx, tx) bytes over counted interfaces.
pub async fn network_io() -> (u64, u64) {
    match tokio::fs::read_to_string("/proc/net/dev").await {
        Ok(net_dev) => parse_net_dev(&net_dev),
        Err(_) => (0, 0),
    }
}

/// CPU busy share from the cumulative `cpu ` line of /proc/stat.
pub fn parse_cpu_percent(stat: &str) -> f64 {
    for line in stat.lines() {
        let Some(rest) = line.strip_prefix("cpu ") else { continue };
        let fields: Vec<u64> = rest.split_whitespace().filter_map(|f| f.parse().ok()).collect();
        if fields.len() >= 4 {
            let total: u64 = fields.iter().sum();
            let idle = fields[3];
            if total > 0 {
                return 100.0 * (total - idle) as f64 / total as f64;
            }
        }
    }
    0.0
}

/// Memory usage from /proc/meminfo: (percent, used, total) in bytes.
/// Used counts neither buffers nor page cache.
pub fn parse_meminfo(meminfo: &str) -> (f64, u64, u64) {
    let mut total = 0u64;
    let mut free = 0u64;
    let mut buffers = 0u64;
    let mut cached = 0u64;
    for line in meminfo.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(kb)) = (parts.next(), parts.next()) else { continue };
        let Ok(kb) = kb.parse::<u64>() else { continue };
        match key {
            "MemTotal:" => total = kb * 1024,
            "MemFree:" => free = kb * 1024,
            "Buffers:" => buffers = kb * 1024,
            "Cached:" => cached = kb * 1024,
            _ => {}
        }
    }
    if total == 0 {
        return (0.0, 0, 0);
    }
    let used = total.saturating_sub(free).saturating_sub(buffers).saturating_sub(cached);
    (100.0 * used as f64 / total as f64, used, total)
}

/// Cumulative (rx, tx) bytes from /proc/net/dev, skipping loopback and
/// docker bridges.
pub fn parse_net_dev(net_dev: &str) -> (u64, u64) {
    let mut rx = 0u64;
    let mut tx = 0u64;
    for line in net_dev.lines().skip(2) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 {
            continue;
        }
        let iface = parts[0].trim_end_matches(':');
        if iface == "lo" || iface.starts_with("docker") {
            continue;
        }
        rx += parts[1].parse::<u64>().unwrap_or(0);
        tx += parts[9].parse::<u64>().unwrap_or(0);
    }
    (rx, tx)
}

/// Root filesystem usage from `df -P /` output: (percent, used, total)
/// in bytes.
pub fn parse_df_root(output: &str) -> (f64, u64, u64) {
    let Some(line) = output.lines().nth(1) else { return (0.0, 0, 0) };
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return (0.0, 0, 0);
    }
    let total = parts[1].parse::<u64>().unwrap_or(0) * 1024;
    let used = parts[2].parse::<u64>().unwrap_or(0) * 1024;
    let percent = parts[4].trim_end_matches('%').parse::<f64>().unwrap_or(0.0);
    (percent, used, total)
}

/// Boot time formatted the way the server GUI renders it.
pub fn boot_time_from_uptime(uptime: &str) -> String {
    let secs = uptime.split_whitespace().next().and_then(|v| v.parse::<f64>().ok());
    let boot = match secs {
        Some(secs) => chrono::Local::now() - chrono::Duration::seconds(secs as i64),
        None => chrono::Local::now(),
    };
    boot.format("%d.%m.%Y %H:%M:%S").to_string()
}

async fn disk_usage() -> (f64, u64, u64) {
    match tokio::process::Command::new("df").args(["-P", "/"]).output().await {
        Ok(out) if out.status.success() => parse_df_root(&String::from_utf8_lossy(&out.stdout)),
        _ => (0.0, 0, 0),
    }
}

/// Kernel name, normally `Linux`.
pub async fn os_type() -> String {
    match tokio::fs::read_to_string("/proc/sys/kernel/ostype").await {
        Ok(ostype) => ostype.trim().to_owned(),
        Err(_) => std::env::consts::OS.to_owned(),
    }
}

/// Platform string in the `<os>-<release>-<arch>` shape the server GUI
/// displays.
pub async fn platform_full() -> String {
    let ostype = os_type().await;
    let release = tokio::fs::read_to_string("/proc/sys/kernel/osrelease")
        .await
        .map(|r| r.trim().to_owned())
        .unwrap_or_default();
    format!("{ostype}-{release}-{}", std::env::consts::ARCH)
}

/// Local IP via a routed (never actually sent) UDP datagram socket.
pub fn local_ip() -> String {
    let probe = || -> std::io::Result<String> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip().to_string())
    };
    probe().unwrap_or_else(|_| "127.0.0.1".to_owned())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
