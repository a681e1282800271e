// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Platform driver library presence

use super::{Probe, ProbeContext, ProbeResult, DRIVER_LIBRARY};
use crate::error::Result;

pub struct DriverLibraryProbe;

impl Probe for DriverLibraryProbe {
    fn name(&self) -> &'static str {
        DRIVER_LIBRARY
    }

    fn check(&self, ctx: &ProbeContext) -> Result<ProbeResult> {
        let env = &ctx.environment;
        let path = env.platform_driver_lib_path.as_str();

        let result = match env.platform_driver_lib_size_bytes {
            Some(size) if env.platform_driver_lib_present && size > 0 => {
                ProbeResult::pass(DRIVER_LIBRARY, format!("{path} present ({size} bytes)"))
                    .with_detail("size_bytes", size)
            }
            _ if env.platform_driver_lib_present => {
                ProbeResult::warning(DRIVER_LIBRARY, format!("{path} exists but is empty"))
                    .with_detail("size_bytes", 0)
            }
            _ => ProbeResult::warning(
                DRIVER_LIBRARY,
                format!("{path} not found; the platform may install it elsewhere"),
            ),
        };

        Ok(result
            .with_detail("path", path)
            .with_detail("present", env.platform_driver_lib_present))
    }
}
