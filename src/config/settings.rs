// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for gpuprobe
//!
//! Loaded from ~/.gpuprobe/settings.json (or `--config`). Every field has a
//! default, so a missing or partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::driver::default_library_names;
use crate::report::OverrideRule;

mod io;
mod migration;
mod validation;

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Upper bound for a single probe (native calls included)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Upper bound for the external process monitor
    #[serde(default = "default_process_timeout_secs")]
    pub process_timeout_secs: u64,

    /// Geometry of the pinned test buffer
    #[serde(default)]
    pub pinned_buffer: PinnedBufferConfig,

    /// Driver library names tried in order
    #[serde(default = "default_library_names")]
    pub driver_library_names: Vec<String>,

    /// Where the virtualized platform ships its driver library
    #[serde(default = "default_platform_driver_library_path")]
    pub platform_driver_library_path: PathBuf,

    /// Kernel identity file
    #[serde(default = "default_kernel_version_path")]
    pub kernel_version_path: PathBuf,

    /// Case-insensitive substrings marking a hosted/virtualized kernel
    #[serde(default = "default_virtualization_markers")]
    pub virtualization_markers: Vec<String>,

    /// External process queried for the driver version string
    #[serde(default)]
    pub process_monitor: ProcessMonitorConfig,

    /// Extra environment overrides, appended after the built-in ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<OverrideRule>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
            process_timeout_secs: default_process_timeout_secs(),
            pinned_buffer: PinnedBufferConfig::default(),
            driver_library_names: default_library_names(),
            platform_driver_library_path: default_platform_driver_library_path(),
            kernel_version_path: default_kernel_version_path(),
            virtualization_markers: default_virtualization_markers(),
            process_monitor: ProcessMonitorConfig::default(),
            overrides: Vec::new(),
        }
    }
}

/// Pinned buffer size, expressed as a matrix of `f32` elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedBufferConfig {
    #[serde(default = "default_pinned_rows")]
    pub rows: usize,

    #[serde(default = "default_pinned_cols")]
    pub cols: usize,
}

impl Default for PinnedBufferConfig {
    fn default() -> Self {
        Self {
            rows: default_pinned_rows(),
            cols: default_pinned_cols(),
        }
    }
}

impl PinnedBufferConfig {
    pub fn elements(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    pub fn bytes(&self) -> usize {
        self.elements().saturating_mul(std::mem::size_of::<f32>())
    }
}

/// External diagnostic utility invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMonitorConfig {
    #[serde(default = "default_monitor_program")]
    pub program: String,

    #[serde(default = "default_monitor_args")]
    pub args: Vec<String>,
}

impl Default for ProcessMonitorConfig {
    fn default() -> Self {
        Self {
            program: default_monitor_program(),
            args: default_monitor_args(),
        }
    }
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_process_timeout_secs() -> u64 {
    5
}

fn default_pinned_rows() -> usize {
    1000
}

fn default_pinned_cols() -> usize {
    1000
}

fn default_platform_driver_library_path() -> PathBuf {
    PathBuf::from("/usr/lib/wsl/lib/libcuda.so.1")
}

fn default_kernel_version_path() -> PathBuf {
    PathBuf::from("/proc/version")
}

fn default_virtualization_markers() -> Vec<String> {
    vec!["microsoft".to_string(), "wsl".to_string()]
}

fn default_monitor_program() -> String {
    "nvidia-smi".to_string()
}

fn default_monitor_args() -> Vec<String> {
    vec![
        "--query-gpu=driver_version".to_string(),
        "--format=csv,noheader".to_string(),
    ]
}
