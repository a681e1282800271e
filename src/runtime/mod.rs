// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Accelerator runtime seam
//!
//! The probes only need seven operations from the accelerator runtime:
//! availability, device count, device properties, pinned host allocation,
//! pinned-flag verification, host-to-device transfer and peer-access
//! queries. [`AcceleratorRuntime`] captures exactly those. Buffers come back
//! as guards, so page-locked and device memory is released when the guard
//! drops, whichever way the probe exits.

pub mod cuda;
pub mod simulated;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cuda::CudaRuntime;
pub use simulated::{PinnedBehavior, SimulatedRuntime};

/// Errors reported by an accelerator runtime backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The backend could not be brought up at all
    #[error("accelerator runtime unavailable: {0}")]
    Unavailable(String),

    /// A runtime call returned a non-success code
    #[error("{op} failed with code {code}")]
    Call { op: &'static str, code: i32 },

    /// Device ordinal out of range
    #[error("invalid device ordinal {0}")]
    InvalidDevice(usize),

    /// Page-locked host allocation failed
    #[error("pinned allocation failed: {0}")]
    Allocation(String),

    /// Host-to-device transfer failed
    #[error("host-to-device transfer failed: {0}")]
    Transfer(String),
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Properties of one enumerated accelerator device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub compute_major: u32,
    pub compute_minor: u32,
    pub total_memory_bytes: u64,
    pub multiprocessor_count: u32,
}

impl DeviceInfo {
    /// Unified virtual addressing needs compute capability 2.0 or newer.
    pub fn uva_supported(&self) -> bool {
        self.compute_major >= 2
    }

    /// Compute capability formatted as `major.minor`.
    pub fn compute_capability(&self) -> String {
        format!("{}.{}", self.compute_major, self.compute_minor)
    }
}

/// Host allocation handed out by [`AcceleratorRuntime::alloc_pinned`].
pub trait HostBuffer: Send {
    /// Size in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the runtime reports this allocation as page-locked.
    fn is_pinned(&self) -> bool;

    fn as_bytes(&self) -> &[u8];

    fn as_bytes_mut(&mut self) -> &mut [u8];
}

/// Device allocation produced by a host-to-device transfer.
pub trait DeviceBuffer: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordinal of the device holding the allocation.
    fn device(&self) -> usize;
}

/// The subset of the accelerator runtime the probes rely on.
pub trait AcceleratorRuntime: Send + Sync {
    /// Short backend name for reports (e.g. `cuda`, `simulated`).
    fn backend(&self) -> &str;

    fn is_available(&self) -> bool;

    fn device_count(&self) -> RuntimeResult<usize>;

    fn device_properties(&self, index: usize) -> RuntimeResult<DeviceInfo>;

    fn alloc_pinned(&self, bytes: usize) -> RuntimeResult<Box<dyn HostBuffer + '_>>;

    fn copy_to_device(
        &self,
        device: usize,
        host: &dyn HostBuffer,
    ) -> RuntimeResult<Box<dyn DeviceBuffer + '_>>;

    fn can_access_peer(&self, device: usize, peer: usize) -> RuntimeResult<bool>;
}
