// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Host environment inspection
//!
//! Reads the handful of host facts that change how probe results are
//! interpreted: whether the kernel is a hosted/virtualized one, whether the
//! platform ships its driver library at the expected path, and what the
//! external process monitor says about the driver. Inspection happens once
//! per run; probes only ever see the resulting snapshot.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::config::{ProcessMonitorConfig, Settings};
use crate::error::ProbeError;

/// Outcome of asking the external process monitor for the driver version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessMonitorOutcome {
    Reported { driver_version: String },
    Failed { reason: String },
    TimedOut { after_ms: u64 },
    NotFound,
}

/// Snapshot of host signals taken at run start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSignals {
    pub is_virtualized_hosted_kernel: bool,
    pub kernel_version_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_release: Option<String>,
    pub platform_driver_lib_path: String,
    pub platform_driver_lib_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_driver_lib_size_bytes: Option<u64>,
    pub process_monitor_available: bool,
    pub process_monitor: ProcessMonitorOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_memory_bytes: Option<u64>,
}

impl EnvironmentSignals {
    /// Driver version string as reported by the process monitor.
    pub fn driver_version_string(&self) -> Option<&str> {
        match &self.process_monitor {
            ProcessMonitorOutcome::Reported { driver_version } => Some(driver_version),
            _ => None,
        }
    }

    /// A plain bare-metal Linux host with nothing special detected.
    pub fn bare_metal() -> Self {
        Self {
            is_virtualized_hosted_kernel: false,
            kernel_version_string: "Linux version 6.8.0-generic".to_string(),
            kernel_release: Some("6.8.0-generic".to_string()),
            platform_driver_lib_path: "/usr/lib/wsl/lib/libcuda.so.1".to_string(),
            platform_driver_lib_present: false,
            platform_driver_lib_size_bytes: None,
            process_monitor_available: false,
            process_monitor: ProcessMonitorOutcome::NotFound,
            host_memory_bytes: None,
        }
    }
}

/// Source of [`EnvironmentSignals`] for a run.
#[async_trait]
pub trait HostInspector: Send + Sync {
    async fn inspect(&self) -> EnvironmentSignals;
}

/// A fixed snapshot stands in for the live host.
#[async_trait]
impl HostInspector for EnvironmentSignals {
    async fn inspect(&self) -> EnvironmentSignals {
        self.clone()
    }
}

/// Whether the kernel identity string carries one of the virtualization markers.
pub fn detect_virtualized(kernel_identity: &str, markers: &[String]) -> bool {
    let lower = kernel_identity.to_lowercase();
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .any(|m| lower.contains(&m.to_lowercase()))
}

/// Extract the release from a `/proc/version` style string.
pub fn parse_kernel_release(kernel_identity: &str) -> Option<String> {
    let re = Regex::new(r"Linux version (\S+)").ok()?;
    re.captures(kernel_identity)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Live inspector reading the host.
#[derive(Debug, Clone)]
pub struct EnvironmentInspector {
    kernel_version_path: PathBuf,
    virtualization_markers: Vec<String>,
    platform_driver_lib_path: PathBuf,
    process_monitor: ProcessMonitorConfig,
    process_timeout: Duration,
}

impl EnvironmentInspector {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            kernel_version_path: settings.kernel_version_path.clone(),
            virtualization_markers: settings.virtualization_markers.clone(),
            platform_driver_lib_path: settings.platform_driver_library_path.clone(),
            process_monitor: settings.process_monitor.clone(),
            process_timeout: settings.process_timeout(),
        }
    }

    fn read_kernel_identity(&self) -> String {
        match std::fs::read_to_string(&self.kernel_version_path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                tracing::debug!(
                    path = %self.kernel_version_path.display(),
                    error = %e,
                    "kernel version file unreadable, falling back to sysinfo"
                );
                System::kernel_version().unwrap_or_default()
            }
        }
    }

    async fn query_process_monitor(&self) -> ProcessMonitorOutcome {
        query_process_monitor(&self.process_monitor, self.process_timeout).await
    }
}

#[async_trait]
impl HostInspector for EnvironmentInspector {
    async fn inspect(&self) -> EnvironmentSignals {
        let kernel_version_string = self.read_kernel_identity();
        let is_virtualized_hosted_kernel =
            detect_virtualized(&kernel_version_string, &self.virtualization_markers);
        let kernel_release = parse_kernel_release(&kernel_version_string);

        let (platform_driver_lib_present, platform_driver_lib_size_bytes) =
            stat_library(&self.platform_driver_lib_path);

        let process_monitor = self.query_process_monitor().await;
        let process_monitor_available = !matches!(process_monitor, ProcessMonitorOutcome::NotFound);

        tracing::debug!(
            virtualized = is_virtualized_hosted_kernel,
            platform_lib = platform_driver_lib_present,
            monitor = ?process_monitor,
            "environment inspected"
        );

        EnvironmentSignals {
            is_virtualized_hosted_kernel,
            kernel_version_string,
            kernel_release,
            platform_driver_lib_path: self.platform_driver_lib_path.display().to_string(),
            platform_driver_lib_present,
            platform_driver_lib_size_bytes,
            process_monitor_available,
            process_monitor,
            host_memory_bytes: host_memory_bytes(),
        }
    }
}

fn stat_library(path: &Path) -> (bool, Option<u64>) {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => (true, Some(meta.len())),
        _ => (false, None),
    }
}

fn host_memory_bytes() -> Option<u64> {
    let mut sys = System::new();
    sys.refresh_memory();
    Some(sys.total_memory()).filter(|bytes| *bytes > 0)
}

/// Run the process monitor with a bounded timeout; the child is killed on expiry.
pub async fn query_process_monitor(
    config: &ProcessMonitorConfig,
    timeout: Duration,
) -> ProcessMonitorOutcome {
    let mut command = tokio::process::Command::new(&config.program);
    command
        .args(&config.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Err(_) => {
            let err = ProbeError::ExternalProcessTimeout {
                program: config.program.clone(),
                secs: timeout.as_secs(),
            };
            tracing::warn!(error = %err, "process monitor killed");
            ProcessMonitorOutcome::TimedOut {
                after_ms: timeout.as_millis() as u64,
            }
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => ProcessMonitorOutcome::NotFound,
        Ok(Err(e)) => ProcessMonitorOutcome::Failed {
            reason: e.to_string(),
        },
        Ok(Ok(output)) if !output.status.success() => ProcessMonitorOutcome::Failed {
            reason: format!("{} exited with {}", config.program, output.status),
        },
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
                Some(version) => ProcessMonitorOutcome::Reported {
                    driver_version: version.to_string(),
                },
                None => ProcessMonitorOutcome::Failed {
                    reason: "empty output".to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn markers() -> Vec<String> {
        vec!["microsoft".to_string(), "wsl".to_string()]
    }

    const WSL_VERSION: &str = "Linux version 5.15.153.1-microsoft-standard-WSL2 (root@65c757a075e2) (gcc (GCC) 11.2.0) #1 SMP Fri Mar 29 23:14:13 UTC 2024";

    #[test]
    fn test_detect_virtualized_wsl() {
        assert!(detect_virtualized(WSL_VERSION, &markers()));
    }

    #[test]
    fn test_detect_virtualized_bare_metal() {
        let version = "Linux version 6.8.0-45-generic (buildd@lcy02-amd64-075) #45-Ubuntu SMP";
        assert!(!detect_virtualized(version, &markers()));
    }

    #[test]
    fn test_detect_virtualized_ignores_empty_markers() {
        assert!(!detect_virtualized("anything", &[String::new()]));
    }

    #[test]
    fn test_parse_kernel_release() {
        assert_eq!(
            parse_kernel_release(WSL_VERSION).as_deref(),
            Some("5.15.153.1-microsoft-standard-WSL2")
        );
        assert_eq!(parse_kernel_release("Darwin 23.1.0"), None);
    }

    #[test]
    fn test_stat_library() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("libcuda.so.1");
        std::fs::write(&lib, vec![0u8; 2048]).unwrap();

        assert_eq!(stat_library(&lib), (true, Some(2048)));
        assert_eq!(stat_library(&dir.path().join("missing.so")), (false, None));
        // Directories are not libraries
        assert_eq!(stat_library(dir.path()), (false, None));
    }

    #[tokio::test]
    async fn test_static_signals_inspect_to_themselves() {
        let signals = EnvironmentSignals::bare_metal();
        assert_eq!(signals.inspect().await, signals);
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let config = ProcessMonitorConfig {
            program: "definitely-not-a-real-monitor-xyz".to_string(),
            args: Vec::new(),
        };
        let outcome = query_process_monitor(&config, Duration::from_secs(2)).await;
        assert_eq!(outcome, ProcessMonitorOutcome::NotFound);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_monitor_reports_first_line() {
        let config = ProcessMonitorConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "echo; echo 550.54.15".to_string()],
        };
        let outcome = query_process_monitor(&config, Duration::from_secs(5)).await;
        assert_eq!(
            outcome,
            ProcessMonitorOutcome::Reported {
                driver_version: "550.54.15".to_string()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_monitor_nonzero_exit_is_failed() {
        let config = ProcessMonitorConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "exit 9".to_string()],
        };
        let outcome = query_process_monitor(&config, Duration::from_secs(5)).await;
        assert!(matches!(outcome, ProcessMonitorOutcome::Failed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_monitor_times_out() {
        let config = ProcessMonitorConfig {
            program: "sleep".to_string(),
            args: vec!["10".to_string()],
        };
        let outcome = query_process_monitor(&config, Duration::from_millis(100)).await;
        assert_eq!(outcome, ProcessMonitorOutcome::TimedOut { after_ms: 100 });
    }

    #[tokio::test]
    async fn test_inspector_reads_configured_paths() {
        let dir = TempDir::new().unwrap();
        let version = dir.path().join("version");
        std::fs::write(&version, format!("{WSL_VERSION}\n")).unwrap();
        let lib = dir.path().join("libcuda.so.1");
        std::fs::write(&lib, b"ELF").unwrap();

        let settings = Settings {
            kernel_version_path: version,
            platform_driver_library_path: lib,
            process_monitor: ProcessMonitorConfig {
                program: "definitely-not-a-real-monitor-xyz".to_string(),
                args: Vec::new(),
            },
            ..Settings::default()
        };

        let signals = EnvironmentInspector::from_settings(&settings).inspect().await;
        assert!(signals.is_virtualized_hosted_kernel);
        assert_eq!(signals.kernel_version_string, WSL_VERSION);
        assert!(signals.platform_driver_lib_present);
        assert_eq!(signals.platform_driver_lib_size_bytes, Some(3));
        assert!(!signals.process_monitor_available);
        assert!(signals.driver_version_string().is_none());
    }
}
