// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Driver version string from the external process monitor
//!
//! Kept separate from the native version code; the two can disagree, and
//! when both exist the result records whether they do.

use super::{Probe, ProbeContext, ProbeResult, DRIVER_METADATA};
use crate::environment::ProcessMonitorOutcome;
use crate::error::Result;

pub struct DriverMetadataProbe;

/// Whether the reported string starts with the native `major.minor`.
fn agrees_with_native(reported: &str, native_major: u32, native_minor: u32) -> bool {
    let native = format!("{native_major}.{native_minor}");
    reported.trim() == native || reported.trim().starts_with(&format!("{native}."))
}

impl Probe for DriverMetadataProbe {
    fn name(&self) -> &'static str {
        DRIVER_METADATA
    }

    fn check(&self, ctx: &ProbeContext) -> Result<ProbeResult> {
        let result = match &ctx.environment.process_monitor {
            ProcessMonitorOutcome::Reported { driver_version } => {
                let mut result = ProbeResult::pass(
                    DRIVER_METADATA,
                    format!("process monitor reports driver {driver_version}"),
                )
                .with_detail("driver_version_string", driver_version.clone());

                if ctx.driver.has_version() {
                    result = result.with_detail(
                        "agrees_with_native",
                        agrees_with_native(
                            driver_version,
                            ctx.driver.version_major,
                            ctx.driver.version_minor,
                        ),
                    );
                }
                result
            }
            ProcessMonitorOutcome::TimedOut { after_ms } => {
                ProbeResult::fail(DRIVER_METADATA, "timeout").with_detail("after_ms", *after_ms)
            }
            ProcessMonitorOutcome::Failed { reason } => ProbeResult::warning(
                DRIVER_METADATA,
                format!("process monitor failed: {reason}"),
            ),
            ProcessMonitorOutcome::NotFound => {
                ProbeResult::warning(DRIVER_METADATA, "process monitor not installed")
            }
        };
        Ok(result)
    }
}
