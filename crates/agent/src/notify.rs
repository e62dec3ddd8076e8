// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Desktop notification delivery into active graphical sessions.

use std::time::Duration;

use serde_json::{json, Value};

use crate::desktop::{self, GraphicalSession};

/// Title shown on the desktop notification.
const NOTIFY_TITLE: &str = "Сообщение от администратора";

/// `show_message:<text>`: notify every active session, falling back to
/// a zenity dialog when notify-send is refused.
pub async fn show_message(message: &str) -> Value {
    if desktop::which("notify-send").is_none() {
        return json!({ "message_result": "error", "error": "❌ Команда 'notify-send' не найдена." });
    }

    let sessions = desktop::graphical_sessions().await;
    if sessions.is_empty() {
        return json!({ "error": "❌ Не найдено активных графических сессий" });
    }

    let mut delivered = 0usize;
    let mut failed = 0usize;
    for session in &sessions {
        if notify_session(session, message).await {
            delivered += 1;
        } else {
            failed += 1;
        }
    }

    if failed > 0 {
        json!({
            "message_result": "error",
            "error": format!("❌ Не удалось отправить уведомление для {failed} сессий."),
        })
    } else {
        json!({
            "message_result": "success",
            "info": format!("✅ Сообщение отправлено в {delivered} сессий."),
        })
    }
}

async fn notify_session(session: &GraphicalSession, message: &str) -> bool {
    let notify = [
        "notify-send",
        "--icon=dialog-information",
        "--urgency=normal",
        "--expire-time=10000",
        NOTIFY_TITLE,
        message,
    ];
    if let Ok(output) =
        desktop::run_as_user(session, &notify, None, Duration::from_secs(10)).await
    {
        if output.status.success() {
            return true;
        }
    }

    if desktop::which("zenity").is_none() {
        return false;
    }
    let short: String = if message.chars().count() > 200 {
        let mut truncated: String = message.chars().take(200).collect();
        truncated.push_str("...");
        truncated
    } else {
        message.to_owned()
    };
    let title = format!("--title={NOTIFY_TITLE}");
    let text = format!("--text={short}");
    let zenity =
        ["zenity", "--info", title.as_str(), text.as_str(), "--width=400", "--timeout=10"];
    matches!(
        desktop::run_as_user(session, &zenity, None, Duration::from_secs(15)).await,
        Ok(output) if output.status.success()
    )
}
