// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for gpuprobe
//!
//! Only [`ProbeError::DeviceEnumeration`] is fatal to a run. Every other
//! variant is recovered at the boundary that produced it and recorded as
//! data inside the capability report.

use thiserror::Error;

use crate::runtime::RuntimeError;

/// Main error type for gpuprobe operations
#[derive(Error, Debug)]
pub enum ProbeError {
    /// No accelerator devices (or no usable runtime at all)
    #[error("Device enumeration failed: {0}")]
    DeviceEnumeration(String),

    /// A probe body failed; downgraded to a `Fail` result
    #[error("Probe '{probe}' failed: {reason}")]
    ProbeExecution { probe: String, reason: String },

    /// None of the candidate native libraries could be opened
    #[error("Native library load failed ({candidates}): {reason}")]
    NativeLibraryLoad { candidates: String, reason: String },

    /// The library loaded but does not export the symbol
    #[error("Native symbol missing: {symbol}: {reason}")]
    NativeSymbolMissing { symbol: String, reason: String },

    /// The symbol was called and returned a non-success code
    #[error("Native call {symbol} returned error code {code}")]
    NativeCall { symbol: String, code: i32 },

    /// External diagnostic process did not finish in time
    #[error("External process '{program}' timed out after {secs}s")]
    ExternalProcessTimeout { program: String, secs: u64 },

    /// Accelerator runtime errors
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbeError {
    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::DeviceEnumeration(_))
    }

    /// Whether the driver library itself is unusable (as opposed to a call failing).
    pub fn is_driver_unavailable(&self) -> bool {
        matches!(
            self,
            ProbeError::NativeLibraryLoad { .. } | ProbeError::NativeSymbolMissing { .. }
        )
    }
}

/// Result type alias for gpuprobe operations
pub type Result<T> = std::result::Result<T, ProbeError>;
