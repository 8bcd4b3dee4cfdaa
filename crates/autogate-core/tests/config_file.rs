//! Loading configuration from disk and layering environment overrides.

use std::io::Write;

use autogate_core::{AppConfig, Error};
use rstest::rstest;
use tempfile::NamedTempFile;

/// Write `contents` to a temporary file removed when the handle drops.
fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("autogate-")
        .suffix(".json")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_file_then_env() {
    let file = config_file(
        r#"{
            "gate": { "open_angle": 75.0, "ease_ms": 250 },
            "buzzer": { "queue_size": 5 },
            "generator": { "channel_capacity": 0 }
        }"#,
    );

    let mut config = AppConfig::from_json_file(file.path()).unwrap();
    config.apply_env([("GATE_OPEN_ANGLE", "80"), ("AUTOGATE_DEBOUNCE_US", "1000")]).unwrap();

    assert_eq!(config.gate.open_angle, 80.0);
    assert_eq!(config.gate.ease_ms, 250);
    assert_eq!(config.buzzer.queue_size, 5);
    assert_eq!(config.generator.channel_capacity, 0);
    assert_eq!(config.button.debounce_us, 1_000);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");
    assert!(matches!(AppConfig::from_json_file(path), Err(Error::Io(_))));
}

#[rstest]
#[case(r#"{ "gate": { "close_angle": 200.0 } }"#)]
#[case(r#"{ "buzzer": { "min_frequency_hz": 900.0, "max_frequency_hz": 800.0 } }"#)]
#[case(r#"{ "screen": { "rows": 0 } }"#)]
#[case(r#"{ "status_lights": { "write_attempts": 0 } }"#)]
fn test_file_is_validated(#[case] json: &str) {
    let file = config_file(json);
    let result = AppConfig::from_json_file(file.path());

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_round_trip_through_file() {
    let mut saved = AppConfig::default();
    saved.rfid.rescan_window_ms = 1_500;
    saved.status_lights.reverse_layout = false;

    let file = config_file(&serde_json::to_string_pretty(&saved).unwrap());
    let loaded = AppConfig::from_json_file(file.path()).unwrap();

    assert_eq!(loaded, saved);
}
