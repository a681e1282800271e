// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Native driver bridge
//!
//! Loads the platform driver library by its well-known name and asks it for
//! the integer driver version. This is the low-level data point the runtime
//! API does not expose. A missing library and a missing symbol are reported
//! as different errors; neither stops the pipeline.

use std::os::raw::c_int;

use libloading::Library;
use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};

/// Exported symbol returning the driver version code.
pub const DRIVER_VERSION_SYMBOL: &str = "cuDriverGetVersion";

/// Well-known driver library names for the current platform, in load order.
pub fn default_library_names() -> Vec<String> {
    #[cfg(target_os = "windows")]
    {
        vec!["nvcuda.dll".to_string()]
    }

    #[cfg(not(target_os = "windows"))]
    {
        vec!["libcuda.so.1".to_string(), "libcuda.so".to_string()]
    }
}

/// Open the first loadable library among `candidates`.
pub(crate) fn open_library(candidates: &[String]) -> Result<(Library, String)> {
    let mut last_error = String::from("no candidate library names configured");

    for name in candidates {
        // SAFETY: loading the vendor driver runs its initialisers; nothing
        // else in the process depends on their side effects.
        match unsafe { Library::new(name) } {
            Ok(lib) => {
                tracing::debug!(library = %name, "opened native driver library");
                return Ok((lib, name.clone()));
            }
            Err(e) => {
                tracing::debug!(library = %name, error = %e, "driver library candidate rejected");
                last_error = e.to_string();
            }
        }
    }

    Err(ProbeError::NativeLibraryLoad {
        candidates: candidates.join(", "),
        reason: last_error,
    })
}

/// Driver facts reported by the native library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    pub version_major: u32,
    pub version_minor: u32,
    pub loaded: bool,
    /// Raw integer version code as returned by the driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_version: Option<i32>,
    /// Library name that was opened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    /// Why the version could not be obtained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DriverInfo {
    /// Decode a driver version code (`12040` is 12.4).
    pub fn from_version_code(code: i32, library: impl Into<String>) -> Self {
        let code_u = code.max(0) as u32;
        Self {
            version_major: code_u / 1000,
            version_minor: (code_u % 1000) / 10,
            loaded: true,
            raw_version: Some(code),
            library: Some(library.into()),
            error: None,
        }
    }

    /// The bridge could not load the library or resolve the symbol.
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            loaded: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// The library loaded but the version query itself failed.
    pub fn query_failed(library: Option<String>, error: impl Into<String>) -> Self {
        Self {
            loaded: true,
            library,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Downgrade a bridge outcome into data, the way the pipeline records it.
    pub fn from_outcome(outcome: Result<DriverInfo>) -> Self {
        match outcome {
            Ok(info) => info,
            Err(e) if e.is_driver_unavailable() => Self::unavailable(e.to_string()),
            Err(e) => Self::query_failed(None, e.to_string()),
        }
    }

    /// Whether a version number was actually obtained.
    pub fn has_version(&self) -> bool {
        self.loaded && self.raw_version.is_some()
    }

    pub fn version_string(&self) -> Option<String> {
        self.has_version()
            .then(|| format!("{}.{}", self.version_major, self.version_minor))
    }
}

/// Source of the native driver version.
#[cfg_attr(test, mockall::automock)]
pub trait DriverBridge: Send + Sync {
    fn driver_version(&self) -> Result<DriverInfo>;
}

/// [`DriverBridge`] backed by the real driver library.
#[derive(Debug, Clone)]
pub struct NativeDriverBridge {
    candidates: Vec<String>,
}

impl NativeDriverBridge {
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }
}

impl Default for NativeDriverBridge {
    fn default() -> Self {
        Self::new(default_library_names())
    }
}

impl DriverBridge for NativeDriverBridge {
    fn driver_version(&self) -> Result<DriverInfo> {
        // Handle is dropped (library unloaded) when this function returns.
        let (lib, name) = open_library(&self.candidates)?;

        type DriverGetVersion = unsafe extern "C" fn(*mut c_int) -> c_int;
        // SAFETY: signature matches `CUresult cuDriverGetVersion(int*)`.
        let get_version = unsafe { lib.get::<DriverGetVersion>(DRIVER_VERSION_SYMBOL.as_bytes()) }
            .map_err(|e| ProbeError::NativeSymbolMissing {
                symbol: DRIVER_VERSION_SYMBOL.to_string(),
                reason: e.to_string(),
            })?;

        let mut version: c_int = 0;
        // SAFETY: `version` outlives the call and is a valid out-pointer.
        let code = unsafe { get_version(&mut version) };
        if code != 0 {
            return Err(ProbeError::NativeCall {
                symbol: DRIVER_VERSION_SYMBOL.to_string(),
                code,
            });
        }

        Ok(DriverInfo::from_version_code(version, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_version_code() {
        let info = DriverInfo::from_version_code(12040, "libcuda.so.1");
        assert_eq!(info.version_major, 12);
        assert_eq!(info.version_minor, 4);
        assert!(info.loaded);
        assert_eq!(info.version_string().as_deref(), Some("12.4"));
    }

    #[test]
    fn test_decode_version_code_minor_rounding() {
        let info = DriverInfo::from_version_code(11085, "libcuda.so.1");
        assert_eq!(info.version_major, 11);
        assert_eq!(info.version_minor, 8);
    }

    #[test]
    fn test_unavailable_is_zeroed() {
        let info = DriverInfo::unavailable("not found");
        assert!(!info.loaded);
        assert_eq!(info.version_major, 0);
        assert_eq!(info.version_minor, 0);
        assert!(info.version_string().is_none());
    }

    #[test]
    fn test_missing_library_is_load_failure() {
        let bridge = NativeDriverBridge::new(vec!["libdefinitely-not-a-driver.so.9".to_string()]);
        let err = bridge.driver_version().unwrap_err();
        assert!(matches!(err, ProbeError::NativeLibraryLoad { .. }));
        assert!(err.is_driver_unavailable());
    }

    #[test]
    fn test_empty_candidates_is_load_failure() {
        let bridge = NativeDriverBridge::new(Vec::new());
        assert!(matches!(
            bridge.driver_version(),
            Err(ProbeError::NativeLibraryLoad { .. })
        ));
    }

    #[test]
    fn test_from_outcome_downgrades_load_failure() {
        let info = DriverInfo::from_outcome(Err(ProbeError::NativeSymbolMissing {
            symbol: DRIVER_VERSION_SYMBOL.to_string(),
            reason: "undefined".to_string(),
        }));
        assert!(!info.loaded);
        assert!(info.error.unwrap().contains(DRIVER_VERSION_SYMBOL));
    }

    #[test]
    fn test_from_outcome_keeps_library_on_call_failure() {
        let info = DriverInfo::from_outcome(Err(ProbeError::NativeCall {
            symbol: DRIVER_VERSION_SYMBOL.to_string(),
            code: 3,
        }));
        assert!(info.loaded);
        assert!(!info.has_version());
    }

    #[test]
    fn test_mock_bridge() {
        let mut bridge = MockDriverBridge::new();
        bridge
            .expect_driver_version()
            .times(1)
            .returning(|| Ok(DriverInfo::from_version_code(12060, "libcuda.so.1")));
        let info = bridge.driver_version().unwrap();
        assert_eq!(info.version_string().as_deref(), Some("12.6"));
    }
}
