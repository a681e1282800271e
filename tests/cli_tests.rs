// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::Path;
use std::process::{Command, Output};

use clap::Parser;
use gpuprobe::cli::{Cli, Commands, OutputFormat};
use tempfile::TempDir;

fn run_binary(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gpuprobe"))
        .args(args)
        .env("GPUPROBE_HOME", home)
        .env_remove("RUST_LOG")
        .output()
        .expect("Binary should start")
}

#[test]
fn test_no_arguments_runs_check() {
    let cli = Cli::try_parse_from(["gpuprobe"]).expect("Valid command parsing");
    assert!(cli.command.is_none());
    assert_eq!(cli.format, OutputFormat::Text);
}

#[test]
fn test_explicit_check() {
    let cli = Cli::try_parse_from(["gpuprobe", "check"]).expect("Valid command parsing");
    assert_eq!(cli.command, Some(Commands::Check));
}

#[test]
fn test_all_global_flags() {
    let cli = Cli::try_parse_from([
        "gpuprobe",
        "-vv",
        "--format",
        "json",
        "--config",
        "/etc/gpuprobe.json",
        "--timeout",
        "3",
    ])
    .expect("Valid command parsing");
    assert_eq!(cli.verbose, 2);
    assert_eq!(cli.format, OutputFormat::Json);
    assert_eq!(cli.timeout, Some(3));
    assert!(cli.config.is_some());
}

#[test]
fn test_invalid_timeout() {
    assert!(Cli::try_parse_from(["gpuprobe", "--timeout", "soon"]).is_err());
    assert!(Cli::try_parse_from(["gpuprobe", "--timeout", "0"]).is_err());
}

#[test]
fn test_unknown_subcommand() {
    assert!(Cli::try_parse_from(["gpuprobe", "chat"]).is_err());
}

#[test]
fn test_missing_runtime_exits_with_status_one() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("settings.json");
    std::fs::write(&config, r#"{ "driver_library_names": ["libno-such-cuda.so.0"] }"#).unwrap();

    let output = run_binary(dir.path(), &["--config", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Device enumeration failed"), "stderr: {stderr}");
}

#[test]
fn test_error_output_is_plain_when_piped() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("settings.json");
    std::fs::write(&config, r#"{ "driver_library_names": ["libno-such-cuda.so.0"] }"#).unwrap();

    let output = run_binary(dir.path(), &["--config", config.to_str().unwrap()]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error: "), "stderr: {stderr}");
    assert!(!stderr.contains('\u{1b}'));
}

#[test]
fn test_invalid_settings_exit_with_status_one() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("settings.json");
    std::fs::write(&config, r#"{ "probe_timeout_secs": 0 }"#).unwrap();

    let output = run_binary(dir.path(), &["config", "--config", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Configuration error"));
}

#[test]
fn test_config_command_succeeds_without_settings_file() {
    let dir = TempDir::new().unwrap();

    let output = run_binary(dir.path(), &["config", "--format", "json"]);

    assert_eq!(output.status.code(), Some(0));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["filePresent"], false);
    assert_eq!(json["activeOverrides"], 1);
}
