// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{AgentConfig, Paths};
use crate::screenshot::{Capture, CaptureBackend};
use crate::settings::{MonitorMode, Settings};
use crate::state::Agent;
use crate::transfer::download::DEFAULT_CHUNK_SIZE;
use crate::transport::Outbound;

use super::{dispatch, AptCommand, Command, DispatchCtx, InteractiveCommand};

#[test]
fn plain_verbs_parse() {
    assert_eq!(Command::parse("refresh").unwrap(), Command::Refresh);
    assert_eq!(Command::parse("screenshot").unwrap(), Command::Screenshot);
    assert_eq!(Command::parse("get_settings").unwrap(), Command::GetSettings);
    assert_eq!(Command::parse("shutdown").unwrap(), Command::Shutdown);
    assert_eq!(Command::parse("reboot").unwrap(), Command::Reboot);
    assert_eq!(Command::parse("get_full_system_info").unwrap(), Command::GetFullSystemInfo);
}

#[yare::parameterized(
    default_chunk = { "download_file_chunked:/tmp/file.bin", DEFAULT_CHUNK_SIZE, "/tmp/file.bin" },
    explicit_chunk = { "download_file_chunked:1024:/tmp/file.bin", 1024, "/tmp/file.bin" },
    digits_then_letters_is_a_path = { "download_file_chunked:123abc:/x", DEFAULT_CHUNK_SIZE, "123abc:/x" },
)]
fn download_chunk_size_tie_break(raw: &str, chunk_size: usize, path: &str) {
    assert_eq!(
        Command::parse(raw).unwrap(),
        Command::DownloadFileChunked { chunk_size, path: path.to_owned() }
    );
}

#[test]
fn upload_start_splits_path_and_size() {
    assert_eq!(
        Command::parse("upload_file_start:/tmp/x.bin:5").unwrap(),
        Command::UploadFileStart { path: "/tmp/x.bin".to_owned(), size: 5 }
    );
}

#[test]
fn upload_start_without_size_is_an_error() {
    assert!(Command::parse("upload_file_start:/tmp/x.bin").is_err());
    assert!(Command::parse("upload_file_start:/tmp/x.bin:five").is_err());
}

#[yare::parameterized(
    bare = { "upload_file_end", None },
    with_hash = { "upload_file_end:deadbeef", Some("deadbeef") },
    empty_hash = { "upload_file_end:", None },
)]
fn upload_end_optional_hash(raw: &str, hash: Option<&str>) {
    assert_eq!(
        Command::parse(raw).unwrap(),
        Command::UploadFileEnd { hash: hash.map(str::to_owned) }
    );
}

#[test]
fn rename_needs_both_paths() {
    assert_eq!(
        Command::parse("rename_path:/a:/b").unwrap(),
        Command::RenamePath { old: "/a".to_owned(), new: "/b".to_owned() }
    );
    assert!(Command::parse("rename_path:/only-one").is_err());
}

#[test]
fn screenshot_quality_clamps() {
    assert_eq!(Command::parse("screenshot_quality:150").unwrap(), Command::ScreenshotQuality { quality: 100 });
    assert_eq!(Command::parse("screenshot_quality:0").unwrap(), Command::ScreenshotQuality { quality: 1 });
    assert!(Command::parse("screenshot_quality:max").is_err());
}

#[test]
fn settings_payloads_parse_as_json_at_ingress() {
    assert_eq!(
        Command::parse(r#"apply_settings:{"monitoring_interval":30}"#).unwrap(),
        Command::ApplySettings { patch: json!({ "monitoring_interval": 30 }) }
    );
    assert!(Command::parse("apply_settings:{broken").is_err());
    assert_eq!(
        Command::parse(r#"screenshot_settings:{"quality":5}"#).unwrap(),
        Command::ScreenshotSettings { patch: json!({ "quality": 5 }) }
    );
}

#[test]
fn apt_verbs_parse() {
    assert_eq!(Command::parse("apt:get_repos").unwrap(), Command::Apt(AptCommand::GetRepos));
    assert_eq!(Command::parse("apt:update").unwrap(), Command::Apt(AptCommand::Update));
    assert_eq!(
        Command::parse("apt:list_upgradable").unwrap(),
        Command::Apt(AptCommand::ListUpgradable)
    );
    assert_eq!(
        Command::parse("apt:save_repo:/etc/apt/sources.list.d/test.list:ZGViIC4uLg==").unwrap(),
        Command::Apt(AptCommand::SaveRepo {
            path: "/etc/apt/sources.list.d/test.list".to_owned(),
            content_b64: "ZGViIC4uLg==".to_owned(),
        })
    );
    assert_eq!(
        Command::parse("apt:upgrade_packages:vim curl").unwrap(),
        Command::Apt(AptCommand::UpgradePackages { names: "vim curl".to_owned() })
    );
    assert_eq!(
        Command::parse("apt:frobnicate").unwrap(),
        Command::Apt(AptCommand::Unknown("frobnicate".to_owned()))
    );
}

#[test]
fn interactive_verbs_parse() {
    assert_eq!(
        Command::parse("interactive:start:/bin/bash -l").unwrap(),
        Command::Interactive(InteractiveCommand::Start { command: "/bin/bash -l".to_owned() })
    );
    // Input payloads keep their colons and trailing newline.
    assert_eq!(
        Command::parse("interactive:input:echo a:b\n").unwrap(),
        Command::Interactive(InteractiveCommand::Input { data: "echo a:b\n".to_owned() })
    );
    assert_eq!(
        Command::parse("interactive:stop").unwrap(),
        Command::Interactive(InteractiveCommand::Stop)
    );
    assert_eq!(
        Command::parse("interactive:resize:24,80").unwrap(),
        Command::Interactive(InteractiveCommand::Resize { rows: 24, cols: 80 })
    );
    assert!(Command::parse("interactive:resize:24x80").is_err());
}

#[test]
fn execute_keeps_everything_after_the_first_colon() {
    assert_eq!(
        Command::parse("execute:ls -la | grep foo:bar").unwrap(),
        Command::Execute { line: "ls -la | grep foo:bar".to_owned() }
    );
}

#[test]
fn unknown_verbs_are_preserved() {
    assert_eq!(Command::parse("dance").unwrap(), Command::Unknown("dance".to_owned()));
    assert_eq!(
        Command::parse("dance:fast").unwrap(),
        Command::Unknown("dance:fast".to_owned())
    );
}

// -- Dispatch-level behavior --------------------------------------------------

struct NoCapture;

impl CaptureBackend for NoCapture {
    fn capture(
        &self,
        _quality: u8,
        _mode: MonitorMode,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<Capture>> + Send + '_>>
    {
        Box::pin(async { anyhow::bail!("no display") })
    }
}

async fn test_agent(dir: &tempfile::TempDir) -> Arc<Agent> {
    let config = AgentConfig {
        server_host: "127.0.0.1".to_owned(),
        server_port: 1,
        auth_token: "tok".to_owned(),
        client_id: "cafebabecafebabecafebabecafebabe".to_owned(),
        version: "0.0.0-test".to_owned(),
    };
    let paths = Paths { config_dir: dir.path().join("etc") };
    Agent::new(config, paths, Settings::default(), Arc::new(NoCapture)).await
}

fn ctx_pair() -> (DispatchCtx, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(256);
    (DispatchCtx { outbound: Outbound::new(tx), jobs: CancellationToken::new() }, rx)
}

async fn next_frame(rx: &mut mpsc::Receiver<String>) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("outbound closed");
    serde_json::from_str(&frame).expect("frame is not JSON")
}

#[tokio::test]
async fn command_with_id_is_acked_then_answered() {
    let dir = tempfile::tempdir().unwrap();
    let agent = test_agent(&dir).await;
    let (ctx, mut rx) = ctx_pair();

    dispatch(&agent, &ctx, r#"{"command":"get_settings","command_id":"42"}"#).await;

    let ack = next_frame(&mut rx).await;
    assert_eq!(ack["command_ack"], "42");

    let response = next_frame(&mut rx).await;
    assert_eq!(response["command_id"], "42");
    let settings = &response["client_settings"];
    assert_eq!(settings["monitoring_interval"], 10);
    assert!(settings.get("client_id").is_none());
}

#[tokio::test]
async fn command_without_id_gets_no_ack() {
    let dir = tempfile::tempdir().unwrap();
    let agent = test_agent(&dir).await;
    let (ctx, mut rx) = ctx_pair();

    dispatch(&agent, &ctx, r#"{"command":"get_screenshot_settings"}"#).await;

    let response = next_frame(&mut rx).await;
    assert!(response.get("command_ack").is_none());
    assert_eq!(response["screenshot_settings"]["quality"], 85);
    assert!(response.get("command_id").is_none());
}

#[tokio::test]
async fn malformed_json_answers_error_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let agent = test_agent(&dir).await;
    let (ctx, mut rx) = ctx_pair();

    dispatch(&agent, &ctx, "{ this is not json").await;
    let error = next_frame(&mut rx).await;
    assert!(error["error"].as_str().unwrap().contains("Invalid command frame"));

    // The dispatcher still works afterwards.
    dispatch(&agent, &ctx, r#"{"command":"get_settings"}"#).await;
    assert!(next_frame(&mut rx).await.get("client_settings").is_some());
}

#[tokio::test]
async fn unknown_verb_answers_error_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let agent = test_agent(&dir).await;
    let (ctx, mut rx) = ctx_pair();

    dispatch(&agent, &ctx, r#"{"command":"dance:fast","command_id":"9"}"#).await;
    let ack = next_frame(&mut rx).await;
    assert_eq!(ack["command_ack"], "9");
    let error = next_frame(&mut rx).await;
    assert!(error["error"].as_str().unwrap().contains("Unknown command"));
    assert_eq!(error["command_id"], "9");
}

#[tokio::test]
async fn malformed_args_surface_as_execution_failure() {
    let dir = tempfile::tempdir().unwrap();
    let agent = test_agent(&dir).await;
    let (ctx, mut rx) = ctx_pair();

    dispatch(&agent, &ctx, r#"{"command":"upload_file_start:/tmp/x.bin"}"#).await;
    let error = next_frame(&mut rx).await;
    assert!(error["error"].as_str().unwrap().contains("Command execution failed"));
}

#[tokio::test]
async fn frames_without_command_key_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let agent = test_agent(&dir).await;
    let (ctx, mut rx) = ctx_pair();

    dispatch(&agent, &ctx, r#"{"pong":true}"#).await;
    assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.is_err());
}

#[tokio::test]
async fn apply_settings_merges_persists_and_answers() {
    let dir = tempfile::tempdir().unwrap();
    let agent = test_agent(&dir).await;
    let (ctx, mut rx) = ctx_pair();

    let frame = json!({
        "command": r#"apply_settings:{"monitoring_interval":25,"client_id":"spoofed","screenshot":{"quality":500}}"#,
    });
    dispatch(&agent, &ctx, &frame.to_string()).await;

    let response = next_frame(&mut rx).await;
    assert_eq!(response["settings_applied"], "success");
    assert_eq!(response["new_settings"]["monitoring_interval"], 25);
    assert_eq!(response["new_settings"]["screenshot"]["quality"], 100);
    assert!(response["new_settings"].get("client_id").is_none());

    // The live settings changed and the client id stayed untouched.
    let settings = agent.settings.read().await;
    assert_eq!(settings.monitoring_interval, 25);
    assert!(settings.client_id.is_none());
}
