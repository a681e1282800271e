// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Informational host environment probe

use super::{Probe, ProbeContext, ProbeResult, ENVIRONMENT};
use crate::error::Result;

/// Echoes the environment snapshot into the report. Always `Pass`.
pub struct EnvironmentProbe;

impl Probe for EnvironmentProbe {
    fn name(&self) -> &'static str {
        ENVIRONMENT
    }

    fn check(&self, ctx: &ProbeContext) -> Result<ProbeResult> {
        let env = &ctx.environment;
        let message = if env.is_virtualized_hosted_kernel {
            "virtualized hosted kernel detected"
        } else {
            "no virtualization layer detected"
        };

        let mut result = ProbeResult::pass(ENVIRONMENT, message)
            .with_detail("virtualized_hosted_kernel", env.is_virtualized_hosted_kernel)
            .with_detail("kernel_version", env.kernel_version_string.clone())
            .with_detail("process_monitor_available", env.process_monitor_available);

        if let Some(release) = &env.kernel_release {
            result = result.with_detail("kernel_release", release.clone());
        }
        if let Some(bytes) = env.host_memory_bytes {
            result = result.with_detail("host_memory_bytes", bytes);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::test_support::{context, single_device};
    use crate::probes::ProbeStatus;

    #[test]
    fn test_bare_metal_passes() {
        let result = EnvironmentProbe.run(&context(single_device()));
        assert_eq!(result.status(), ProbeStatus::Pass);
        assert_eq!(result.detail()["virtualized_hosted_kernel"], false);
        assert_eq!(result.detail()["kernel_release"], "6.8.0-generic");
    }

    #[test]
    fn test_virtualized_is_still_informational() {
        let mut ctx = context(single_device());
        ctx.environment.is_virtualized_hosted_kernel = true;
        ctx.environment.host_memory_bytes = Some(64 << 30);
        let result = EnvironmentProbe.run(&ctx);
        assert_eq!(result.status(), ProbeStatus::Pass);
        assert_eq!(result.message(), "virtualized hosted kernel detected");
        assert_eq!(result.detail()["host_memory_bytes"], 64u64 << 30);
    }
}
