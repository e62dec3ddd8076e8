// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Full hardware and OS inventory for `get_full_system_info`.
//!
//! Each collector shells out to the usual Linux tooling and degrades to
//! `"N/A"` (or an empty list) when the tool is missing. Display units
//! match what the server GUI renders.

use regex::Regex;
use serde_json::{json, Value};

/// Assemble the whole inventory. Individual probe failures never fail the
/// frame; they show up as `"N/A"` fields.
pub async fn full_system_info() -> Value {
    json!({
        "os_distro": os_distro().await,
        "os_version": os_version().await,
        "architecture": std::env::consts::ARCH,
        "kernel": kernel().await,
        "uptime": uptime().await,
        "install_date": install_date().await,
        "cpu_model": cpu_model().await,
        "cpu_cores": cpu_cores().await,
        "cpu_freq": cpu_freq().await,
        "ram_total": ram_total().await,
        "gpu": gpu().await,
        "motherboard": dmidecode_field("baseboard", "Product Name:").await,
        "bios": dmidecode_field("bios", "Version:").await,
        "storage": storage().await,
        "network": network_interfaces().await,
        "usb_devices": usb_devices().await,
        "audio_devices": audio_devices().await,
        "cameras": cameras().await,
    })
}

async fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = tokio::process::Command::new(program).args(args).output().await.ok()?;
    output.status.success().then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn os_distro() -> String {
    if tokio::fs::try_exists("/etc/astra_version").await.unwrap_or(false) {
        return "Astra Linux".to_owned();
    }
    match tokio::fs::read_to_string("/etc/os-release").await {
        Ok(release) => parse_os_release(&release, "NAME").unwrap_or_else(|| "Linux".to_owned()),
        Err(_) => "Linux".to_owned(),
    }
}

async fn os_version() -> String {
    if let Ok(version) = tokio::fs::read_to_string("/etc/astra_version").await {
        let version = version.trim();
        if !version.is_empty() {
            return version.to_owned();
        }
    }
    tokio::fs::read_to_string("/etc/os-release")
        .await
        .ok()
        .and_then(|release| parse_os_release(&release, "VERSION"))
        .unwrap_or_else(|| "N/A".to_owned())
}

/// Extract a `KEY="value"` field from /etc/os-release.
pub fn parse_os_release(content: &str, key: &str) -> Option<String> {
    for line in content.lines() {
        let Some((name, value)) = line.split_once('=') else { continue };
        if name == key {
            return Some(value.trim_matches('"').to_owned());
        }
    }
    None
}

async fn kernel() -> String {
    tokio::fs::read_to_string("/proc/sys/kernel/osrelease")
        .await
        .map(|release| release.trim().to_owned())
        .unwrap_or_else(|_| "N/A".to_owned())
}

async fn uptime() -> String {
    let raw = tokio::fs::read_to_string("/proc/uptime").await.unwrap_or_default();
    match raw.split_whitespace().next().and_then(|v| v.parse::<f64>().ok()) {
        Some(secs) => humanize_uptime(secs as u64),
        None => "N/A".to_owned(),
    }
}

/// Humanize an uptime in the GUI's units: days, hours, minutes.
pub fn humanize_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days} д"));
    }
    if hours > 0 {
        parts.push(format!("{hours} ч"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes} м"));
    }
    parts.join(" ")
}

async fn install_date() -> String {
    let mtime = tokio::fs::metadata("/var/log/installer/syslog")
        .await
        .ok()
        .and_then(|meta| meta.modified().ok());
    match mtime {
        Some(modified) => {
            chrono::DateTime::<chrono::Local>::from(modified).format("%Y-%m-%d").to_string()
        }
        None => "N/A".to_owned(),
    }
}

async fn cpu_model() -> String {
    let cpuinfo = tokio::fs::read_to_string("/proc/cpuinfo").await.unwrap_or_default();
    parse_cpuinfo_field(&cpuinfo, "model name").unwrap_or_else(|| "N/A".to_owned())
}

async fn cpu_cores() -> String {
    let cpuinfo = tokio::fs::read_to_string("/proc/cpuinfo").await.unwrap_or_default();
    let cores = cpuinfo.lines().filter(|line| line.starts_with("processor")).count();
    if cores == 0 {
        return "N/A".to_owned();
    }
    format!("{cores} ядер")
}

async fn cpu_freq() -> String {
    let cpuinfo = tokio::fs::read_to_string("/proc/cpuinfo").await.unwrap_or_default();
    match parse_cpuinfo_field(&cpuinfo, "cpu MHz").and_then(|f| f.parse::<f64>().ok()) {
        Some(freq) => format!("{freq:.1} MHz"),
        None => "N/A".to_owned(),
    }
}

/// First `key : value` entry from /proc/cpuinfo.
pub fn parse_cpuinfo_field(cpuinfo: &str, key: &str) -> Option<String> {
    for line in cpuinfo.lines() {
        if line.starts_with(key) {
            if let Some((_, value)) = line.split_once(':') {
                return Some(value.trim().to_owned());
            }
        }
    }
    None
}

async fn ram_total() -> String {
    let meminfo = tokio::fs::read_to_string("/proc/meminfo").await.unwrap_or_default();
    match parse_cpuinfo_field(&meminfo, "MemTotal")
        .and_then(|v| v.split_whitespace().next().map(str::to_owned))
        .and_then(|kb| kb.parse::<u64>().ok())
    {
        Some(kb) => format!("{:.1} GB", kb as f64 / 1024.0 / 1024.0),
        None => "N/A".to_owned(),
    }
}

async fn gpu() -> String {
    match run("sh", &["-c", "lspci | grep -i vga"]).await {
        Some(out) if !out.trim().is_empty() => out.trim().to_owned(),
        _ => "N/A".to_owned(),
    }
}

async fn dmidecode_field(table: &str, field: &str) -> String {
    let Some(out) = run("dmidecode", &["-t", table]).await else {
        return "N/A".to_owned();
    };
    for line in out.lines() {
        if line.contains(field) {
            if let Some((_, value)) = line.split_once(':') {
                return value.trim().to_owned();
            }
        }
    }
    "N/A".to_owned()
}

/// Human-readable byte count (binary units, one decimal).
pub fn format_bytes(mut size: f64) -> String {
    if size == 0.0 {
        return "0B".to_owned();
    }
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut unit = 0;
    while size >= 1024.0 && unit < units.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", units[unit])
}

async fn storage() -> Vec<Value> {
    match run("df", &["-P"]).await {
        Some(out) => parse_df_all(&out),
        None => Vec::new(),
    }
}

/// Parse `df -P` output into per-mount entries.
pub fn parse_df_all(output: &str) -> Vec<Value> {
    let mut mounts = Vec::new();
    for line in output.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        let total = parts[1].parse::<u64>().unwrap_or(0) * 1024;
        let used = parts[2].parse::<u64>().unwrap_or(0) * 1024;
        mounts.push(json!({
            "device": parts[0],
            "mountpoint": parts[5],
            "size": format_bytes(total as f64),
            "used": format!("{} ({})", format_bytes(used as f64), parts[4]),
            "fstype": "N/A",
        }));
    }
    mounts
}

async fn network_interfaces() -> Vec<Value> {
    let Some(out) = run("ip", &["-j", "addr"]).await else {
        return Vec::new();
    };
    parse_ip_addr(&out)
}

/// Parse `ip -j addr` JSON into per-interface entries.
pub fn parse_ip_addr(output: &str) -> Vec<Value> {
    let Ok(interfaces) = serde_json::from_str::<Vec<Value>>(output) else {
        return Vec::new();
    };
    interfaces
        .iter()
        .map(|iface| {
            let ip = iface
                .get("addr_info")
                .and_then(Value::as_array)
                .and_then(|addrs| {
                    addrs.iter().find(|a| a.get("family").and_then(Value::as_str) == Some("inet"))
                })
                .and_then(|a| a.get("local"))
                .and_then(Value::as_str)
                .unwrap_or("N/A");
            json!({
                "interface": iface.get("ifname").and_then(Value::as_str).unwrap_or("N/A"),
                "ip": ip,
                "mac": iface.get("address").and_then(Value::as_str).unwrap_or("N/A"),
                "status": iface.get("operstate").and_then(Value::as_str).unwrap_or("N/A"),
            })
        })
        .collect()
}

async fn usb_devices() -> Vec<Value> {
    match run("lsusb", &[]).await {
        Some(out) => parse_lsusb(&out),
        None => Vec::new(),
    }
}

/// Parse `lsusb` lines into device entries.
pub fn parse_lsusb(output: &str) -> Vec<Value> {
    let Ok(re) = Regex::new(
        r"Bus\s+(\d+)\s+Device\s+(\d+):\s+ID\s+([0-9a-fA-F]{4}:[0-9a-fA-F]{4})\s+(.*)",
    ) else {
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| re.captures(line))
        .map(|caps| {
            json!({
                "device": caps.get(4).map(|m| m.as_str().trim()).unwrap_or(""),
                "vendor": caps.get(3).map(|m| m.as_str()).unwrap_or(""),
                "version": "USB",
                "status": "Подключено",
            })
        })
        .collect()
}

async fn audio_devices() -> Vec<Value> {
    match run("aplay", &["-l"]).await {
        Some(out) => parse_aplay(&out),
        None => Vec::new(),
    }
}

/// Parse `aplay -l` card lines into playback device entries.
pub fn parse_aplay(output: &str) -> Vec<Value> {
    let Ok(re) = Regex::new(r"card\s+\d+:\s+.*?\[(.*?)\]") else {
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| re.captures(line))
        .map(|caps| {
            json!({
                "device": caps.get(1).map(|m| m.as_str().trim()).unwrap_or(""),
                "type": "Аудио (воспроизведение)",
                "status": "Доступно",
            })
        })
        .collect()
}

async fn cameras() -> Vec<Value> {
    let Some(out) = run("sh", &["-c", "find /dev -name 'video*'"]).await else {
        return Vec::new();
    };
    let mut cameras = Vec::new();
    for device in out.lines().filter(|line| !line.is_empty()) {
        let mut name = device.to_owned();
        if let Some(v4l2) = run("v4l2-ctl", &["--device", device, "--all"]).await {
            if let Some(card) = parse_v4l2_card_type(&v4l2) {
                name = card;
            }
        }
        cameras.push(json!({ "device": name, "type": "Видео", "status": "Доступно" }));
    }
    cameras
}

/// Extract the `Card type` field from `v4l2-ctl --all` output.
pub fn parse_v4l2_card_type(output: &str) -> Option<String> {
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Card type") {
            return Some(rest.trim_start_matches([' ', ':']).trim().to_owned());
        }
    }
    None
}

#[cfg(test)]
#[path = "sysinfo_tests.rs"]
mod tests;
