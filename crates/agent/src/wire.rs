// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame envelope helpers for the agent ↔ server protocol.
//!
//! Every frame is a UTF-8 JSON object. Inbound command frames carry a
//! `command` string and an optional `command_id`; responses echo the id
//! at the top level so the server can correlate them.

use serde::Deserialize;
use serde_json::{json, Value};

/// Inbound command envelope: `{"command": "<verb[:args…]>", "command_id": "…"}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandFrame {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub command_id: Option<String>,
}

/// Local time in the ISO-8601 shape the server GUI expects.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Ack frame sent before executing a command that carries an id.
pub fn ack(command_id: &str) -> Value {
    json!({ "command_ack": command_id, "timestamp": timestamp() })
}

/// Echo the originating `command_id` onto a response envelope.
pub fn attach_command_id(mut response: Value, command_id: Option<&str>) -> Value {
    if let (Some(id), Some(obj)) = (command_id, response.as_object_mut()) {
        obj.insert("command_id".to_owned(), Value::String(id.to_owned()));
    }
    response
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
