// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Capability probes
//!
//! A probe is one self-contained check against the live environment. Probes
//! implement [`Probe::check`] and may fail with a [`ProbeError`]; the
//! provided [`Probe::run`] turns any such failure into a `Fail` result, so
//! nothing escapes a probe as an error. Probes read the shared
//! [`ProbeContext`] snapshot and never mutate anything outside their own
//! scoped allocations.

mod compute;
mod driver_library;
mod driver_metadata;
mod environment;
mod managed;
mod peer;
mod pinned;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PinnedBufferConfig;
use crate::driver::DriverInfo;
use crate::environment::EnvironmentSignals;
use crate::error::{ProbeError, Result};
use crate::runtime::{AcceleratorRuntime, DeviceInfo};

pub use compute::{evaluate_devices, ComputeCapabilityProbe};
pub use driver_library::DriverLibraryProbe;
pub use driver_metadata::DriverMetadataProbe;
pub use environment::EnvironmentProbe;
pub use managed::{ManagedMemoryProbe, DRIVER_UNAVAILABLE_MESSAGE};
pub use peer::PeerAccessProbe;
pub use pinned::PinnedMemoryProbe;

/// Stable probe names, used as keys by the aggregator and override table.
pub const COMPUTE_CAPABILITY: &str = "compute_capability";
pub const PINNED_MEMORY: &str = "pinned_memory";
pub const MANAGED_MEMORY: &str = "managed_memory";
pub const PEER_ACCESS: &str = "peer_access";
pub const ENVIRONMENT: &str = "environment";
pub const DRIVER_LIBRARY: &str = "driver_library";
pub const DRIVER_METADATA: &str = "driver_metadata";

/// Outcome classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Pass,
    Fail,
    NotApplicable,
    Warning,
}

impl ProbeStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            ProbeStatus::Pass => "✓",
            ProbeStatus::Fail => "✗",
            ProbeStatus::NotApplicable => "-",
            ProbeStatus::Warning => "⚠",
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProbeStatus::Pass => "PASS",
            ProbeStatus::Fail => "FAIL",
            ProbeStatus::NotApplicable => "N/A",
            ProbeStatus::Warning => "WARN",
        };
        f.write_str(label)
    }
}

/// Result of one probe execution. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    name: String,
    status: ProbeStatus,
    detail: BTreeMap<String, Value>,
    message: String,
}

impl ProbeResult {
    pub fn new(name: impl Into<String>, status: ProbeStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: BTreeMap::new(),
            message: message.into(),
        }
    }

    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, ProbeStatus::Pass, message)
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, ProbeStatus::Fail, message)
    }

    pub fn warning(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, ProbeStatus::Warning, message)
    }

    pub fn not_applicable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, ProbeStatus::NotApplicable, message)
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, entries: BTreeMap<String, Value>) -> Self {
        self.detail.extend(entries);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProbeStatus {
        self.status
    }

    pub fn detail(&self) -> &BTreeMap<String, Value> {
        &self.detail
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Rebuild this result with a forced status, keeping the observation.
    pub(crate) fn overridden(self, status: ProbeStatus, label: &str, reason: &str) -> Self {
        let observed = self.status;
        let message = format!(
            "environment override ({label}): {reason}; observed: {}",
            self.message
        );
        Self {
            name: self.name,
            status,
            detail: self.detail,
            message,
        }
        .with_detail("override", reason)
        .with_detail("observed_status", observed.to_string())
    }
}

/// Read-only snapshot shared by every probe of one run.
#[derive(Clone)]
pub struct ProbeContext {
    pub runtime: Arc<dyn AcceleratorRuntime>,
    pub devices: Vec<DeviceInfo>,
    pub driver: DriverInfo,
    pub environment: EnvironmentSignals,
    pub pinned_buffer: PinnedBufferConfig,
}

impl fmt::Debug for ProbeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeContext")
            .field("backend", &self.runtime.backend())
            .field("devices", &self.devices)
            .field("driver", &self.driver)
            .field("environment", &self.environment)
            .field("pinned_buffer", &self.pinned_buffer)
            .finish()
    }
}

/// A single capability check.
pub trait Probe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Probe body. Errors are allowed here; `run` converts them.
    fn check(&self, ctx: &ProbeContext) -> Result<ProbeResult>;

    /// Whether `check` calls into `ctx.runtime` for this snapshot.
    fn uses_runtime(&self, _ctx: &ProbeContext) -> bool {
        false
    }

    /// Execute the probe; never returns an error.
    fn run(&self, ctx: &ProbeContext) -> ProbeResult {
        match self.check(ctx) {
            Ok(result) => result,
            Err(e) => {
                let err = match e {
                    e @ ProbeError::ProbeExecution { .. } => e,
                    other => ProbeError::ProbeExecution {
                        probe: self.name().to_string(),
                        reason: other.to_string(),
                    },
                };
                tracing::warn!(probe = self.name(), error = %err, "probe failed");
                ProbeResult::fail(self.name(), err.to_string())
            }
        }
    }
}

/// Built-in probes in execution order.
pub fn default_probes() -> Vec<Arc<dyn Probe>> {
    vec![
        Arc::new(ComputeCapabilityProbe),
        Arc::new(PinnedMemoryProbe),
        Arc::new(ManagedMemoryProbe),
        Arc::new(PeerAccessProbe),
        Arc::new(EnvironmentProbe),
        Arc::new(DriverLibraryProbe),
        Arc::new(DriverMetadataProbe),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::runtime::SimulatedRuntime;

    pub fn context(runtime: SimulatedRuntime) -> ProbeContext {
        let devices = (0..runtime.device_count().unwrap_or(0))
            .filter_map(|i| runtime.device_properties(i).ok())
            .collect();
        ProbeContext {
            runtime: Arc::new(runtime),
            devices,
            driver: DriverInfo::from_version_code(12040, "libcuda.so.1"),
            environment: EnvironmentSignals::bare_metal(),
            pinned_buffer: PinnedBufferConfig { rows: 10, cols: 10 },
        }
    }

    pub fn single_device() -> SimulatedRuntime {
        SimulatedRuntime::new(vec![SimulatedRuntime::device(0, 8, 6, 1 << 34)])
    }
}
