// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;
use serde_json::json;

use super::{MonitorMode, ScreenshotSettings, Settings};

#[test]
fn defaults_match_shipped_profile() {
    let settings = Settings::default();
    assert_eq!(settings.monitoring_interval, 10);
    assert_eq!(settings.reconnect_delay, 5);
    assert_eq!(settings.reconnect_max_delay, 60);
    assert!((settings.reconnect_jitter - 0.2).abs() < f64::EPSILON);
    assert_eq!(settings.screenshot.quality, 85);
    assert_eq!(settings.screenshot.refresh_delay, 5);
    assert!(!settings.screenshot.enabled);
    assert_eq!(settings.screenshot.monitor_mode, MonitorMode::All);
    assert!(settings.client_id.is_none());
}

#[test]
fn screenshot_quality_clamps_to_range() {
    let mut shot = ScreenshotSettings::default();
    shot.merge(&json!({ "quality": 0 }));
    assert_eq!(shot.quality, 1);
    shot.merge(&json!({ "quality": 150 }));
    assert_eq!(shot.quality, 100);
    shot.merge(&json!({ "quality": 42 }));
    assert_eq!(shot.quality, 42);
}

#[test]
fn screenshot_refresh_delay_clamps_to_range() {
    let mut shot = ScreenshotSettings::default();
    shot.merge(&json!({ "refresh_delay": 0 }));
    assert_eq!(shot.refresh_delay, 1);
    shot.merge(&json!({ "refresh_delay": 3600 }));
    assert_eq!(shot.refresh_delay, 60);
}

#[test]
fn invalid_monitor_mode_falls_back_to_all() {
    let mut shot = ScreenshotSettings::default();
    shot.merge(&json!({ "monitor_mode": "primary" }));
    assert_eq!(shot.monitor_mode, MonitorMode::Primary);
    shot.merge(&json!({ "monitor_mode": "sideways" }));
    assert_eq!(shot.monitor_mode, MonitorMode::All);
}

#[test]
fn merge_ignores_client_id() {
    let mut settings = Settings::default();
    settings.client_id = Some("stable-id".to_owned());
    settings.merge(&json!({ "client_id": "attacker-id", "monitoring_interval": 30 }));
    assert_eq!(settings.client_id.as_deref(), Some("stable-id"));
    assert_eq!(settings.monitoring_interval, 30);
}

#[test]
fn merge_ignores_unknown_keys_and_wrong_types() {
    let mut settings = Settings::default();
    settings.merge(&json!({
        "monitoring_interval": "not a number",
        "no_such_key": true,
        "screenshot": { "quality": "high" },
    }));
    assert_eq!(settings, Settings::default());
}

#[test]
fn merge_takes_info_text_and_tags() {
    let mut settings = Settings::default();
    settings.merge(&json!({ "info_text": "rack 4", "tags": ["lab", 3, "dmz"] }));
    assert_eq!(settings.info_text, "rack 4");
    assert_eq!(settings.tags, vec!["lab".to_owned(), "dmz".to_owned()]);
}

#[test]
fn public_json_omits_client_id() {
    let mut settings = Settings::default();
    settings.client_id = Some("secret".to_owned());
    let public = settings.public_json();
    assert!(public.get("client_id").is_none());
    assert_eq!(public["monitoring_interval"], 10);
}

#[test]
fn persisted_roundtrip_preserves_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut settings = Settings::default();
    settings.client_id = Some("abc123".to_owned());
    settings.screenshot.enabled = true;
    super::save(&path, &settings);

    let loaded: Settings =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded, settings);
}

proptest! {
    // Applying the same patch twice must not move any field: clamps are
    // idempotent.
    #[test]
    fn merge_is_idempotent(
        quality in -500i64..500,
        delay in -500i64..500,
        interval in 0u64..10_000,
        jitter in -2.0f64..2.0,
        enabled in any::<bool>(),
    ) {
        let patch = json!({
            "monitoring_interval": interval,
            "reconnect_jitter": jitter,
            "screenshot": { "quality": quality, "refresh_delay": delay, "enabled": enabled },
        });
        let mut once = Settings::default();
        once.merge(&patch);
        let mut twice = once.clone();
        twice.merge(&patch);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merged_screenshot_fields_stay_in_range(quality in -500i64..500, delay in -500i64..500) {
        let mut shot = ScreenshotSettings::default();
        shot.merge(&json!({ "quality": quality, "refresh_delay": delay }));
        prop_assert!((1..=100).contains(&shot.quality));
        prop_assert!((1..=60).contains(&shot.refresh_delay));
    }
}
