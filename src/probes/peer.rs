// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Peer-to-peer access between devices

use serde_json::Value;

use super::{Probe, ProbeContext, ProbeResult, PEER_ACCESS};
use crate::error::Result;

/// Queries every ordered pair of distinct devices. Never gates the decision.
pub struct PeerAccessProbe;

impl Probe for PeerAccessProbe {
    fn name(&self) -> &'static str {
        PEER_ACCESS
    }

    fn uses_runtime(&self, ctx: &ProbeContext) -> bool {
        ctx.devices.len() >= 2
    }

    fn check(&self, ctx: &ProbeContext) -> Result<ProbeResult> {
        if ctx.devices.len() < 2 {
            return Ok(ProbeResult::not_applicable(
                PEER_ACCESS,
                format!("{} device(s); peer access needs at least two", ctx.devices.len()),
            ));
        }

        let mut links = Vec::new();
        let mut errors = Vec::new();

        for a in &ctx.devices {
            for b in &ctx.devices {
                if a.index == b.index {
                    continue;
                }
                let key = format!("{}->{}", a.index, b.index);
                let ok = match ctx.runtime.can_access_peer(a.index, b.index) {
                    Ok(ok) => ok,
                    Err(e) => {
                        tracing::debug!(pair = %key, error = %e, "peer query failed");
                        errors.push(Value::String(format!("{key}: {e}")));
                        false
                    }
                };
                links.push((key, ok));
            }
        }

        let enabled = links.iter().filter(|(_, ok)| *ok).count();
        let mut result = if enabled > 0 {
            ProbeResult::pass(
                PEER_ACCESS,
                format!("{enabled} of {} directed links support peer access", links.len()),
            )
        } else {
            ProbeResult::warning(
                PEER_ACCESS,
                "no device pair supports peer access; transfers will stage through host memory",
            )
        };

        for (key, ok) in links {
            result = result.with_detail(key, ok);
        }
        if !errors.is_empty() {
            result = result.with_detail("errors", errors);
        }
        Ok(result)
    }
}
