// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Compute capability / UVA eligibility

use serde_json::json;

use super::{Probe, ProbeContext, ProbeResult, COMPUTE_CAPABILITY};
use crate::error::Result;
use crate::runtime::DeviceInfo;

/// Every enumerated device must support unified virtual addressing.
pub struct ComputeCapabilityProbe;

impl Probe for ComputeCapabilityProbe {
    fn name(&self) -> &'static str {
        COMPUTE_CAPABILITY
    }

    fn check(&self, ctx: &ProbeContext) -> Result<ProbeResult> {
        Ok(evaluate_devices(&ctx.devices))
    }
}

/// Classify a device list: all eligible is `Pass`, some is `Warning`,
/// none (or no devices) is `Fail`.
pub fn evaluate_devices(devices: &[DeviceInfo]) -> ProbeResult {
    if devices.is_empty() {
        return ProbeResult::fail(COMPUTE_CAPABILITY, "no devices").with_detail("device_count", 0);
    }

    let eligible = devices.iter().filter(|d| d.uva_supported()).count();
    let total = devices.len();

    let mut result = if eligible == total {
        ProbeResult::pass(
            COMPUTE_CAPABILITY,
            format!("all {total} device(s) support UVA (compute capability >= 2.0)"),
        )
    } else if eligible > 0 {
        ProbeResult::warning(
            COMPUTE_CAPABILITY,
            format!("{eligible} of {total} devices support UVA (compute capability >= 2.0)"),
        )
    } else {
        ProbeResult::fail(
            COMPUTE_CAPABILITY,
            "no device supports UVA (compute capability < 2.0)",
        )
    };

    result = result
        .with_detail("device_count", total)
        .with_detail("uva_eligible", eligible);

    for device in devices {
        result = result.with_detail(
            format!("gpu{}", device.index),
            json!({
                "name": device.name,
                "compute_capability": device.compute_capability(),
                "total_memory_bytes": device.total_memory_bytes,
                "multiprocessor_count": device.multiprocessor_count,
                "uva_supported": device.uva_supported(),
            }),
        );
    }

    result
}
