// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Environment override table
//!
//! Platform quirks that force a probe's status, keyed by an environment
//! signal. Rules are data: the built-in set lives here and more can be
//! appended from settings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::environment::EnvironmentSignals;
use crate::probes::{ProbeResult, ProbeStatus, MANAGED_MEMORY};

/// Host condition an override rule keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentSignal {
    VirtualizedKernel,
    PlatformDriverLibraryMissing,
    ProcessMonitorUnavailable,
}

impl EnvironmentSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentSignal::VirtualizedKernel => "virtualized_kernel",
            EnvironmentSignal::PlatformDriverLibraryMissing => "platform_driver_library_missing",
            EnvironmentSignal::ProcessMonitorUnavailable => "process_monitor_unavailable",
        }
    }

    /// Whether the signal is raised in this snapshot.
    pub fn is_active(&self, env: &EnvironmentSignals) -> bool {
        match self {
            EnvironmentSignal::VirtualizedKernel => env.is_virtualized_hosted_kernel,
            EnvironmentSignal::PlatformDriverLibraryMissing => !env.platform_driver_lib_present,
            EnvironmentSignal::ProcessMonitorUnavailable => !env.process_monitor_available,
        }
    }
}

impl fmt::Display for EnvironmentSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When `signal` is active, force probe `probe` to `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRule {
    pub signal: EnvironmentSignal,
    pub probe: String,
    pub status: ProbeStatus,
    pub reason: String,
}

impl OverrideRule {
    pub fn new(
        signal: EnvironmentSignal,
        probe: impl Into<String>,
        status: ProbeStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            signal,
            probe: probe.into(),
            status,
            reason: reason.into(),
        }
    }

    fn matches(&self, result: &ProbeResult, env: &EnvironmentSignals) -> bool {
        self.probe == result.name() && self.signal.is_active(env)
    }
}

/// Ordered rule list; the first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    rules: Vec<OverrideRule>,
}

impl OverrideTable {
    pub fn new(rules: Vec<OverrideRule>) -> Self {
        Self { rules }
    }

    /// Rules every run starts with.
    pub fn builtin() -> Self {
        Self::new(vec![OverrideRule::new(
            EnvironmentSignal::VirtualizedKernel,
            MANAGED_MEMORY,
            ProbeStatus::Fail,
            "managed memory (cudaMallocManaged) is not supported under a virtualized hosted kernel",
        )])
    }

    /// Built-in rules followed by `extra`.
    pub fn with_extra(extra: &[OverrideRule]) -> Self {
        let mut table = Self::builtin();
        table.rules.extend(extra.iter().cloned());
        table
    }

    pub fn rules(&self) -> &[OverrideRule] {
        &self.rules
    }

    pub fn apply(&self, result: ProbeResult, env: &EnvironmentSignals) -> ProbeResult {
        match self.rules.iter().find(|rule| rule.matches(&result, env)) {
            Some(rule) => {
                tracing::debug!(
                    probe = result.name(),
                    signal = %rule.signal,
                    status = %rule.status,
                    "applying environment override"
                );
                result.overridden(rule.status, rule.signal.as_str(), &rule.reason)
            }
            None => result,
        }
    }
}
