// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Capability check command

use std::io::{self, Write};

use crossterm::tty::IsTty;

use crate::cli::OutputFormat;
use crate::config::Settings;
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::report::render::render_text;
use crate::report::CapabilityReport;

/// Format a finished report for stdout.
pub fn format_report(report: &CapabilityReport, format: OutputFormat, color: bool) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => Ok(render_text(report, color)),
    }
}

/// Run `pipeline` and write the report to `out`.
pub async fn run_with<W: Write>(
    pipeline: &Pipeline,
    format: OutputFormat,
    out: &mut W,
    color: bool,
) -> Result<CapabilityReport> {
    let report = pipeline.run().await?;
    writeln!(out, "{}", format_report(&report, format, color)?)?;
    Ok(report)
}

/// Execute the check command against the live host
pub async fn execute(settings: &Settings, format: OutputFormat) -> Result<()> {
    let pipeline = Pipeline::from_settings(settings).await?;
    let mut stdout = io::stdout();
    let color = matches!(format, OutputFormat::Text) && stdout.is_tty();
    let report = run_with(&pipeline, format, &mut stdout, color).await?;
    tracing::debug!(decision = %report.decision, "check complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverInfo, MockDriverBridge};
    use crate::environment::EnvironmentSignals;
    use crate::runtime::SimulatedRuntime;
    use std::sync::Arc;

    fn pipeline(virtualized: bool) -> Pipeline {
        let mut bridge = MockDriverBridge::new();
        bridge
            .expect_driver_version()
            .returning(|| Ok(DriverInfo::from_version_code(12040, "libcuda.so.1")));
        let environment = EnvironmentSignals {
            is_virtualized_hosted_kernel: virtualized,
            ..EnvironmentSignals::bare_metal()
        };
        let settings = Settings {
            pinned_buffer: crate::config::PinnedBufferConfig { rows: 8, cols: 8 },
            ..Settings::default()
        };
        Pipeline::new(
            Arc::new(SimulatedRuntime::new(vec![SimulatedRuntime::device(0, 7, 5, 34_359_738_368)])),
            Arc::new(bridge),
            Arc::new(environment),
            &settings,
        )
    }

    #[tokio::test]
    async fn test_text_output() {
        let mut out = Vec::new();
        let report = run_with(&pipeline(true), OutputFormat::Text, &mut out, false)
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("=== CPU Offload Feasibility ==="));
        assert!(text.contains("NOT ELIGIBLE"));
        assert_eq!(report.recommendations.len(), 4);
    }

    #[tokio::test]
    async fn test_json_output_parses_back() {
        let mut out = Vec::new();
        run_with(&pipeline(false), OutputFormat::Json, &mut out, false)
            .await
            .unwrap();
        let parsed: CapabilityReport = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.decision, crate::report::Decision::Eligible);
        assert_eq!(parsed.results.len(), 7);
    }
}
