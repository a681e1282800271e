// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Pinned (page-locked) host memory
//!
//! Three checkpoints, each recorded on its own: allocation, pinned-flag
//! verification, and a host-to-device transfer. Both buffers are guards and
//! are released before the probe returns, on every path.

use serde_json::Value;

use super::{Probe, ProbeContext, ProbeResult, PINNED_MEMORY};
use crate::error::Result;

pub struct PinnedMemoryProbe;

/// Fill the buffer with a recognisable `f32` ramp.
fn fill_pattern(bytes: &mut [u8]) {
    for (i, chunk) in bytes.chunks_exact_mut(std::mem::size_of::<f32>()).enumerate() {
        chunk.copy_from_slice(&((i % 1024) as f32).to_ne_bytes());
    }
}

impl Probe for PinnedMemoryProbe {
    fn name(&self) -> &'static str {
        PINNED_MEMORY
    }

    fn uses_runtime(&self, _ctx: &ProbeContext) -> bool {
        true
    }

    fn check(&self, ctx: &ProbeContext) -> Result<ProbeResult> {
        let bytes = ctx.pinned_buffer.bytes();
        let base = ProbeResult::pass(PINNED_MEMORY, "")
            .with_detail("buffer_bytes", bytes)
            .with_detail(
                "buffer_shape",
                format!("{}x{} f32", ctx.pinned_buffer.rows, ctx.pinned_buffer.cols),
            );

        let mut host = match ctx.runtime.alloc_pinned(bytes) {
            Ok(buffer) => buffer,
            Err(e) => {
                return Ok(ProbeResult::fail(
                    PINNED_MEMORY,
                    format!("pinned allocation failed: {e}"),
                )
                .with_details(base.detail().clone())
                .with_detail("allocation", false)
                .with_detail("pinned", Value::Null)
                .with_detail("transfer", Value::Null));
            }
        };

        fill_pattern(host.as_bytes_mut());
        let pinned = host.is_pinned();

        let target = ctx.devices.first().map(|d| d.index).unwrap_or(0);
        let transfer = ctx
            .runtime
            .copy_to_device(target, &*host)
            .map(|device_buffer| (device_buffer.len(), device_buffer.device()));

        let details = base
            .detail()
            .clone()
            .into_iter()
            .chain([
                ("allocation".to_string(), Value::Bool(true)),
                ("pinned".to_string(), Value::Bool(pinned)),
                ("transfer".to_string(), Value::Bool(transfer.is_ok())),
                ("target_device".to_string(), Value::from(target)),
            ])
            .collect();

        let result = match transfer {
            Err(e) => ProbeResult::fail(PINNED_MEMORY, format!("pinned -> device transfer failed: {e}")),
            Ok(_) if !pinned => ProbeResult::warning(
                PINNED_MEMORY,
                "allocation succeeded but the runtime does not report the buffer as page-locked",
            ),
            Ok((copied, device)) => ProbeResult::pass(
                PINNED_MEMORY,
                format!(
                    "pinned allocation and {copied}-byte transfer to device {device} succeeded"
                ),
            ),
        };

        Ok(result.with_details(details))
    }
}
