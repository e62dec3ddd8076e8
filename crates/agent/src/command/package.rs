// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Self-update via a detached installer, plus power controls.
//!
//! The updater is a throwaway script launched in its own scope/session:
//! it waits for the agent to exit, installs the package, restarts the
//! service, and removes both the package and itself.

use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::desktop::which;
use crate::transport::Outbound;

const UPDATE_SCRIPT: &str = "/tmp/astra-agent-update.sh";
const UPDATE_LOG: &str = "/tmp/astra-agent-update.log";
const SERVICE_NAME: &str = "astra-agent.service";

fn update_script(package_path: &str) -> String {
    format!(
        r#"#!/bin/bash
echo "Запуск скрипта обновления..." > {UPDATE_LOG}

sleep 3

echo "Запуск dpkg -i..." >> {UPDATE_LOG}
DEBIAN_FRONTEND=noninteractive sudo dpkg -i "{package_path}" >> {UPDATE_LOG} 2>&1

echo "Перезапуск службы..." >> {UPDATE_LOG}
sudo systemctl restart {SERVICE_NAME} >> {UPDATE_LOG} 2>&1

echo "Скрипт обновления завершен." >> {UPDATE_LOG}

rm -f "{package_path}"
rm -- "$0"
"#
    )
}

/// `install_package:<path>`: write the updater, detach it, confirm to
/// the server, then exit so the installer can replace us.
pub async fn install_package(outbound: &Outbound, package_path: &str) -> Option<Value> {
    let launched: std::io::Result<()> = async {
        tokio::fs::write(UPDATE_SCRIPT, update_script(package_path)).await?;
        tokio::fs::set_permissions(UPDATE_SCRIPT, std::fs::Permissions::from_mode(0o755)).await?;
        spawn_detached(UPDATE_SCRIPT)
    }
    .await;

    match launched {
        Ok(()) => {
            info!(package_path, "updater launched, exiting for restart");
            let _ = outbound
                .send_json(&json!({
                    "install_result": "🚀 Процесс обновления запущен. Клиент перезапускается..."
                }))
                .await;
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            std::process::exit(0);
        }
        Err(e) => {
            warn!(err = %e, "updater launch failed");
            Some(json!({ "install_result": format!("❌ Не удалось запустить обновление: {e}") }))
        }
    }
}

/// Launch the updater in its own scope/process group so it survives the
/// agent's exit.
fn spawn_detached(script: &str) -> std::io::Result<()> {
    let mut command = if which("systemd-run").is_some() {
        let mut c = Command::new("systemd-run");
        c.arg("--scope").arg(script);
        c
    } else {
        let mut c = Command::new("nohup");
        c.arg(script);
        c
    };
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map(drop)
}

/// `shutdown`: best-effort OS power-off.
pub fn shutdown() -> Value {
    warn!("shutting down the host");
    let _ = Command::new("shutdown").arg("now").spawn();
    json!({ "status": "shutting_down" })
}

/// `reboot`: best-effort OS reboot.
pub fn reboot() -> Value {
    warn!("rebooting the host");
    let _ = Command::new("reboot").spawn();
    json!({ "status": "rebooting" })
}
