// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Sectioned text rendering of a [`CapabilityReport`]

use std::fmt::Write;

use crossterm::style::Stylize;
use serde_json::Value;

use super::{CapabilityReport, Decision};
use crate::environment::ProcessMonitorOutcome;
use crate::probes::ProbeStatus;

fn format_bytes(bytes: u64) -> String {
    const GIB: f64 = (1u64 << 30) as f64;
    const MIB: f64 = (1u64 << 20) as f64;
    let b = bytes as f64;
    if b >= GIB {
        format!("{:.1} GiB", b / GIB)
    } else if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else {
        format!("{bytes} B")
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "n/a".to_string(),
        other => other.to_string(),
    }
}

fn verdict_line(decision: Decision, color: bool) -> String {
    let line = format!("{decision}: {}", decision.description());
    if !color {
        return line;
    }
    match decision {
        Decision::Eligible => line.green().bold().to_string(),
        Decision::NotEligible => line.red().bold().to_string(),
        Decision::Indeterminate => line.yellow().bold().to_string(),
    }
}

/// Render the report as sectioned text. `color` adds ANSI styling to the verdict.
pub fn render_text(report: &CapabilityReport, color: bool) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, report, color);
    out
}

fn write_report(out: &mut String, report: &CapabilityReport, color: bool) -> std::fmt::Result {
    writeln!(out, "\n=== Runtime ===")?;
    writeln!(out, "Backend: {}", report.backend)?;
    match report.driver.version_string() {
        Some(version) => writeln!(
            out,
            "Driver: {version} ({})",
            report.driver.library.as_deref().unwrap_or("unknown library")
        )?,
        None => writeln!(
            out,
            "Driver: unavailable{}",
            report
                .driver
                .error
                .as_deref()
                .map(|e| format!(" ({e})"))
                .unwrap_or_default()
        )?,
    }

    writeln!(out, "\n=== Devices ===")?;
    for device in &report.devices {
        writeln!(
            out,
            "  [{}] {} | compute {} | {} | {} SMs | UVA {}",
            device.index,
            device.name,
            device.compute_capability(),
            format_bytes(device.total_memory_bytes),
            device.multiprocessor_count,
            if device.uva_supported() { "yes" } else { "no" }
        )?;
    }

    writeln!(out, "\n=== Probes ===")?;
    for result in &report.results {
        writeln!(
            out,
            "  {} {:<20} {:<5} {}",
            result.status().symbol(),
            result.name(),
            result.status(),
            result.message()
        )?;
        for (key, value) in result.detail() {
            if value.is_object() {
                continue;
            }
            writeln!(out, "      {key}: {}", format_value(value))?;
        }
    }

    let env = &report.environment;
    writeln!(out, "\n=== Environment ===")?;
    writeln!(
        out,
        "Virtualized hosted kernel: {}",
        if env.is_virtualized_hosted_kernel { "yes" } else { "no" }
    )?;
    writeln!(out, "Kernel: {}", env.kernel_version_string.trim())?;
    writeln!(
        out,
        "Platform driver library: {} ({})",
        env.platform_driver_lib_path,
        match (env.platform_driver_lib_present, env.platform_driver_lib_size_bytes) {
            (true, Some(size)) => format_bytes(size),
            (true, None) => "present".to_string(),
            (false, _) => "missing".to_string(),
        }
    )?;
    let monitor = match &env.process_monitor {
        ProcessMonitorOutcome::Reported { driver_version } => format!("driver {driver_version}"),
        ProcessMonitorOutcome::Failed { reason } => format!("failed ({reason})"),
        ProcessMonitorOutcome::TimedOut { after_ms } => format!("timed out after {after_ms} ms"),
        ProcessMonitorOutcome::NotFound => "not installed".to_string(),
    };
    writeln!(out, "Process monitor: {monitor}")?;
    if let Some(bytes) = env.host_memory_bytes {
        writeln!(out, "Host memory: {}", format_bytes(bytes))?;
    }

    writeln!(out, "\n=== CPU Offload Feasibility ===")?;
    writeln!(out, "{}", verdict_line(report.decision, color))?;

    if !report.recommendations.is_empty() {
        writeln!(out, "\n=== Recommendations ===")?;
        for (i, hint) in report.recommendations.iter().enumerate() {
            writeln!(out, "  {}. {hint}", i + 1)?;
        }
    }

    writeln!(out, "\n=== Summary ===")?;
    let tally: Vec<String> = report
        .tally()
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(status, n)| format!("{n} {status}"))
        .collect();
    writeln!(out, "{} probes: {}", report.results.len(), tally.join(", "))?;
    if report.status_of(crate::probes::MANAGED_MEMORY) == Some(ProbeStatus::Fail)
        && env.is_virtualized_hosted_kernel
    {
        writeln!(
            out,
            "Managed memory is forced to FAIL by an environment override, not by a live allocation."
        )?;
    }
    writeln!(out, "Generated at {}", report.generated_at.to_rfc3339())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::test_support::{context, single_device};
    use crate::probes::{ProbeResult, COMPUTE_CAPABILITY, MANAGED_MEMORY, PINNED_MEMORY};

    fn report(managed: ProbeStatus) -> CapabilityReport {
        let mut ctx = context(single_device());
        ctx.environment.is_virtualized_hosted_kernel = managed == ProbeStatus::Fail;
        CapabilityReport::build(
            &ctx,
            vec![
                ProbeResult::pass(COMPUTE_CAPABILITY, "all 1 device(s) support UVA")
                    .with_detail("device_count", 1),
                ProbeResult::pass(PINNED_MEMORY, "ok").with_detail("pinned", true),
                ProbeResult::new(MANAGED_MEMORY, managed, "managed"),
            ],
        )
    }

    #[test]
    fn test_sections_present() {
        let text = render_text(&report(ProbeStatus::Pass), false);
        for header in [
            "=== Runtime ===",
            "=== Devices ===",
            "=== Probes ===",
            "=== Environment ===",
            "=== CPU Offload Feasibility ===",
            "=== Summary ===",
        ] {
            assert!(text.contains(header), "missing {header}");
        }
        assert!(!text.contains("=== Recommendations ==="));
        assert!(text.contains("ELIGIBLE: CPU offload is supported"));
        assert!(text.contains("device_count: 1"));
        assert!(text.contains("Driver: 12.4 (libcuda.so.1)"));
    }

    #[test]
    fn test_not_eligible_lists_recommendations() {
        let text = render_text(&report(ProbeStatus::Fail), false);
        assert!(text.contains("NOT ELIGIBLE"));
        assert!(text.contains("=== Recommendations ==="));
        assert!(text.contains("  1. Disable managed-memory-dependent"));
        assert!(text.contains("forced to FAIL by an environment override"));
    }

    #[test]
    fn test_plain_output_has_no_escape_codes() {
        let text = render_text(&report(ProbeStatus::Pass), false);
        assert!(!text.contains('\u{1b}'));
        let colored = render_text(&report(ProbeStatus::Pass), true);
        assert!(colored.contains('\u{1b}'));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(34_359_738_368), "32.0 GiB");
        assert_eq!(format_bytes(4_000_000), "3.8 MiB");
        assert_eq!(format_bytes(512), "512 B");
    }
}
