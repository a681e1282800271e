// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::time::Duration;

use crate::error::{ProbeError, Result};

use super::Settings;

/// Largest pinned test buffer accepted (1 GiB).
pub const MAX_PINNED_BUFFER_BYTES: usize = 1 << 30;

impl Settings {
    /// Reject settings that would make the run meaningless or hang.
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout_secs == 0 {
            return Err(ProbeError::Config(
                "probe_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.process_timeout_secs == 0 {
            return Err(ProbeError::Config(
                "process_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.pinned_buffer.rows == 0 || self.pinned_buffer.cols == 0 {
            return Err(ProbeError::Config(
                "pinned_buffer dimensions must be non-zero".to_string(),
            ));
        }
        if self.pinned_buffer.bytes() > MAX_PINNED_BUFFER_BYTES {
            return Err(ProbeError::Config(format!(
                "pinned_buffer of {} bytes exceeds the {} byte limit",
                self.pinned_buffer.bytes(),
                MAX_PINNED_BUFFER_BYTES
            )));
        }
        if self.driver_library_names.iter().all(|n| n.trim().is_empty()) {
            return Err(ProbeError::Config(
                "driver_library_names must name at least one library".to_string(),
            ));
        }
        if self.process_monitor.program.trim().is_empty() {
            return Err(ProbeError::Config(
                "process_monitor.program must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }
}
