// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Deterministic in-process runtime
//!
//! Lets the pipeline be evaluated without hardware: devices, peer links and
//! pinned-memory behaviour are configured up front. Every buffer it hands
//! out is counted, so callers can assert that nothing outlives a probe.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    AcceleratorRuntime, DeviceBuffer, DeviceInfo, HostBuffer, RuntimeError, RuntimeResult,
};

/// How pinned allocations behave on the simulated runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinnedBehavior {
    pub alloc_fails: bool,
    pub reports_pinned: bool,
    pub transfer_fails: bool,
}

impl Default for PinnedBehavior {
    fn default() -> Self {
        Self {
            alloc_fails: false,
            reports_pinned: true,
            transfer_fails: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedRuntime {
    unavailable: Option<String>,
    devices: Vec<DeviceInfo>,
    failing_properties: HashSet<usize>,
    peers: HashSet<(usize, usize)>,
    pinned: PinnedBehavior,
    stall: Option<Duration>,
    live: Arc<AtomicUsize>,
}

impl SimulatedRuntime {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            unavailable: None,
            devices,
            failing_properties: HashSet::new(),
            peers: HashSet::new(),
            pinned: PinnedBehavior::default(),
            stall: None,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A runtime that fails to come up at all.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let mut runtime = Self::new(Vec::new());
        runtime.unavailable = Some(reason.into());
        runtime
    }

    /// Convenience constructor for a device with the given compute capability.
    pub fn device(index: usize, major: u32, minor: u32, total_memory_bytes: u64) -> DeviceInfo {
        DeviceInfo {
            index,
            name: format!("Simulated GPU {index}"),
            compute_major: major,
            compute_minor: minor,
            total_memory_bytes,
            multiprocessor_count: 1,
        }
    }

    /// Allow `device` to access `peer` directly (one direction only).
    #[must_use]
    pub fn with_peer(mut self, device: usize, peer: usize) -> Self {
        self.peers.insert((device, peer));
        self
    }

    #[must_use]
    pub fn with_pinned(mut self, behavior: PinnedBehavior) -> Self {
        self.pinned = behavior;
        self
    }

    /// Make property queries for `index` fail.
    #[must_use]
    pub fn with_failing_properties(mut self, index: usize) -> Self {
        self.failing_properties.insert(index);
        self
    }

    /// Block inside `alloc_pinned` for `duration`.
    #[must_use]
    pub fn with_stall(mut self, duration: Duration) -> Self {
        self.stall = Some(duration);
        self
    }

    /// Number of host/device buffers currently alive.
    pub fn live_allocations(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn check_device(&self, index: usize) -> RuntimeResult<()> {
        if index < self.devices.len() {
            Ok(())
        } else {
            Err(RuntimeError::InvalidDevice(index))
        }
    }

    fn check_available(&self) -> RuntimeResult<()> {
        match &self.unavailable {
            Some(reason) => Err(RuntimeError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

struct SimHostBuffer {
    data: Vec<u8>,
    pinned: bool,
    live: Arc<AtomicUsize>,
}

impl HostBuffer for SimHostBuffer {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn is_pinned(&self) -> bool {
        self.pinned
    }

    fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for SimHostBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct SimDeviceBuffer {
    len: usize,
    device: usize,
    live: Arc<AtomicUsize>,
}

impl DeviceBuffer for SimDeviceBuffer {
    fn len(&self) -> usize {
        self.len
    }

    fn device(&self) -> usize {
        self.device
    }
}

impl Drop for SimDeviceBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AcceleratorRuntime for SimulatedRuntime {
    fn backend(&self) -> &str {
        "simulated"
    }

    fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    fn device_count(&self) -> RuntimeResult<usize> {
        self.check_available()?;
        Ok(self.devices.len())
    }

    fn device_properties(&self, index: usize) -> RuntimeResult<DeviceInfo> {
        self.check_available()?;
        self.check_device(index)?;
        if self.failing_properties.contains(&index) {
            return Err(RuntimeError::Call {
                op: "device_properties",
                code: 999,
            });
        }
        Ok(self.devices[index].clone())
    }

    fn alloc_pinned(&self, bytes: usize) -> RuntimeResult<Box<dyn HostBuffer + '_>> {
        self.check_available()?;
        if let Some(stall) = self.stall {
            std::thread::sleep(stall);
        }
        if self.pinned.alloc_fails {
            return Err(RuntimeError::Allocation(format!(
                "cannot page-lock {bytes} bytes"
            )));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimHostBuffer {
            data: vec![0; bytes],
            pinned: self.pinned.reports_pinned,
            live: Arc::clone(&self.live),
        }))
    }

    fn copy_to_device(
        &self,
        device: usize,
        host: &dyn HostBuffer,
    ) -> RuntimeResult<Box<dyn DeviceBuffer + '_>> {
        self.check_available()?;
        self.check_device(device)?;
        if self.pinned.transfer_fails {
            return Err(RuntimeError::Transfer("simulated copy failure".to_string()));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimDeviceBuffer {
            len: host.len(),
            device,
            live: Arc::clone(&self.live),
        }))
    }

    fn can_access_peer(&self, device: usize, peer: usize) -> RuntimeResult<bool> {
        self.check_available()?;
        self.check_device(device)?;
        self.check_device(peer)?;
        Ok(self.peers.contains(&(device, peer)))
    }
}
