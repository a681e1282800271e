// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::PathBuf;

use gpuprobe::config::Settings;
use gpuprobe::probes::ProbeStatus;
use gpuprobe::report::EnvironmentSignal;
use gpuprobe::ProbeError;
use tempfile::TempDir;

fn write_settings(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("settings.json");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(settings.probe_timeout_secs, 5);
    assert_eq!(settings.pinned_buffer.rows, 1000);
    assert_eq!(settings.process_monitor.program, "nvidia-smi");
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(
        &dir,
        r#"{ "probe_timeout_secs": 9, "virtualization_markers": ["hyperv"] }"#,
    );
    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.probe_timeout_secs, 9);
    assert_eq!(settings.virtualization_markers, vec!["hyperv".to_string()]);
    assert_eq!(settings.process_timeout_secs, 5);
}

#[test]
fn test_pinned_buffer_pair_shorthand() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(&dir, r#"{ "pinned_buffer": [256, 512] }"#);
    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.pinned_buffer.rows, 256);
    assert_eq!(settings.pinned_buffer.cols, 512);
    assert_eq!(settings.pinned_buffer.bytes(), 256 * 512 * 4);
}

#[test]
fn test_invalid_values_are_config_errors() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(&dir, r#"{ "probe_timeout_secs": 0 }"#);
    let err = Settings::load_from(&path).unwrap_err();
    assert!(matches!(err, ProbeError::Config(_)));
    assert!(!err.is_fatal());
}

#[test]
fn test_malformed_json_is_json_error() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(&dir, "{ not json");
    assert!(matches!(
        Settings::load_from(&path).unwrap_err(),
        ProbeError::Json(_)
    ));
}

#[test]
fn test_overrides_loaded_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(
        &dir,
        r#"{
            "overrides": [
                {
                    "signal": "platform_driver_library_missing",
                    "probe": "driver_library",
                    "status": "not_applicable",
                    "reason": "driver installed outside the platform path"
                }
            ]
        }"#,
    );
    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.overrides.len(), 1);
    let rule = &settings.overrides[0];
    assert_eq!(rule.signal, EnvironmentSignal::PlatformDriverLibraryMissing);
    assert_eq!(rule.status, ProbeStatus::NotApplicable);
}

#[test]
fn test_unknown_signal_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_settings(
        &dir,
        r#"{ "overrides": [{ "signal": "full_moon", "probe": "x", "status": "fail", "reason": "" }] }"#,
    );
    assert!(Settings::load_from(&path).is_err());
}

#[test]
fn test_settings_roundtrip_through_file() {
    let dir = TempDir::new().unwrap();
    let original = Settings {
        probe_timeout_secs: 11,
        ..Settings::default()
    };
    let path = write_settings(&dir, &serde_json::to_string_pretty(&original).unwrap());
    let loaded = Settings::load_from(&path).unwrap();
    assert_eq!(loaded.probe_timeout_secs, 11);
    assert_eq!(loaded.driver_library_names, original.driver_library_names);
}

#[test]
fn test_default_path_is_settings_json() {
    assert!(Settings::default_path().ends_with("settings.json"));
}
