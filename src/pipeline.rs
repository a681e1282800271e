// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! End-to-end capability run
//!
//! Device enumeration, environment inspection and the driver query happen
//! once, up front, and are frozen into a [`ProbeContext`]. Only a failed or
//! empty enumeration aborts the run; everything after that is recorded in
//! the report.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::config::{PinnedBufferConfig, Settings};
use crate::driver::{DriverBridge, DriverInfo, NativeDriverBridge, DRIVER_VERSION_SYMBOL};
use crate::environment::{EnvironmentInspector, HostInspector};
use crate::error::{ProbeError, Result};
use crate::probes::{default_probes, ProbeContext};
use crate::report::{CapabilityReport, OverrideTable};
use crate::runner::ProbeRunner;
use crate::runtime::{AcceleratorRuntime, CudaRuntime, DeviceInfo};

pub struct Pipeline {
    runtime: Arc<dyn AcceleratorRuntime>,
    bridge: Arc<dyn DriverBridge>,
    inspector: Arc<dyn HostInspector>,
    runner: ProbeRunner,
    pinned_buffer: PinnedBufferConfig,
    native_timeout: Duration,
}

impl Pipeline {
    /// Wire the collaborators with the built-in probes and the configured overrides.
    pub fn new(
        runtime: Arc<dyn AcceleratorRuntime>,
        bridge: Arc<dyn DriverBridge>,
        inspector: Arc<dyn HostInspector>,
        settings: &Settings,
    ) -> Self {
        let runner = ProbeRunner::new(
            default_probes(),
            OverrideTable::with_extra(&settings.overrides),
            settings.probe_timeout(),
        );
        Self {
            runtime,
            bridge,
            inspector,
            runner,
            pinned_buffer: settings.pinned_buffer,
            native_timeout: settings.probe_timeout(),
        }
    }

    /// Replace the probe runner (custom probe sets).
    #[must_use]
    pub fn with_runner(mut self, runner: ProbeRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Live pipeline: CUDA driver runtime, native bridge, host inspector.
    ///
    /// A driver library that cannot be opened or initialised means there is
    /// no runtime to enumerate, which is reported as a device enumeration
    /// failure.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let candidates = settings.driver_library_names.clone();
        let load = tokio::task::spawn_blocking(move || CudaRuntime::load(&candidates));
        let runtime = match timeout(settings.probe_timeout(), load).await {
            Ok(Ok(Ok(runtime))) => {
                tracing::debug!(library = runtime.library(), "accelerator runtime loaded");
                runtime
            }
            Ok(Ok(Err(e))) => {
                return Err(ProbeError::DeviceEnumeration(e.to_string()));
            }
            Ok(Err(join_error)) => {
                return Err(ProbeError::DeviceEnumeration(format!(
                    "driver initialisation aborted: {join_error}"
                )));
            }
            Err(_) => {
                return Err(ProbeError::DeviceEnumeration(format!(
                    "driver initialisation timed out after {}s",
                    settings.probe_timeout_secs
                )));
            }
        };

        Ok(Self::new(
            Arc::new(runtime),
            Arc::new(NativeDriverBridge::new(settings.driver_library_names.clone())),
            Arc::new(EnvironmentInspector::from_settings(settings)),
            settings,
        ))
    }

    pub fn runner(&self) -> &ProbeRunner {
        &self.runner
    }

    /// Run every probe and aggregate the report.
    pub async fn run(&self) -> Result<CapabilityReport> {
        let devices = self.enumerate_devices().await?;
        tracing::debug!(
            devices = devices.len(),
            backend = self.runtime.backend(),
            "devices enumerated"
        );

        let environment = self.inspector.inspect().await;
        let driver = self.query_driver().await;

        let ctx = Arc::new(ProbeContext {
            runtime: Arc::clone(&self.runtime),
            devices,
            driver,
            environment,
            pinned_buffer: self.pinned_buffer,
        });

        let results = self.runner.run(Arc::clone(&ctx)).await;
        Ok(CapabilityReport::build(&ctx, results))
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        let runtime = Arc::clone(&self.runtime);
        let task = tokio::task::spawn_blocking(move || -> Result<Vec<DeviceInfo>> {
            if !runtime.is_available() {
                let reason = match runtime.device_count() {
                    Err(e) => e.to_string(),
                    Ok(_) => format!("{} runtime is not available", runtime.backend()),
                };
                return Err(ProbeError::DeviceEnumeration(reason));
            }
            let count = runtime.device_count()?;
            if count == 0 {
                return Err(ProbeError::DeviceEnumeration(
                    "no accelerator devices found".to_string(),
                ));
            }
            let devices = (0..count)
                .filter_map(|index| match runtime.device_properties(index) {
                    Ok(device) => Some(device),
                    Err(e) => {
                        tracing::warn!(device = index, error = %e, "skipping device");
                        None
                    }
                })
                .collect();
            Ok(devices)
        });

        match timeout(self.native_timeout, task).await {
            Ok(Ok(Ok(devices))) => Ok(devices),
            Ok(Ok(Err(e @ ProbeError::DeviceEnumeration(_)))) => Err(e),
            Ok(Ok(Err(e))) => Err(ProbeError::DeviceEnumeration(e.to_string())),
            Ok(Err(join_error)) => Err(ProbeError::DeviceEnumeration(format!(
                "enumeration aborted: {join_error}"
            ))),
            Err(_) => Err(ProbeError::DeviceEnumeration(format!(
                "enumeration timed out after {} ms",
                self.native_timeout.as_millis()
            ))),
        }
    }

    async fn query_driver(&self) -> DriverInfo {
        let bridge = Arc::clone(&self.bridge);
        let task = tokio::task::spawn_blocking(move || bridge.driver_version());

        let info = match timeout(self.native_timeout, task).await {
            Ok(Ok(outcome)) => DriverInfo::from_outcome(outcome),
            Ok(Err(join_error)) => DriverInfo::query_failed(
                None,
                format!("{DRIVER_VERSION_SYMBOL} aborted: {join_error}"),
            ),
            Err(_) => DriverInfo::query_failed(
                None,
                format!(
                    "{DRIVER_VERSION_SYMBOL} timed out after {} ms",
                    self.native_timeout.as_millis()
                ),
            ),
        };

        if let Some(error) = &info.error {
            tracing::warn!(loaded = info.loaded, %error, "driver version unavailable");
        }
        info
    }
}
