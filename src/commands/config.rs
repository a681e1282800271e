// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Effective settings command

use std::path::Path;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::config::Settings;
use crate::error::Result;
use crate::report::OverrideTable;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EffectiveSettings<'a> {
    path: String,
    file_present: bool,
    settings: &'a Settings,
    active_overrides: usize,
}

/// Render the effective settings for `path`.
pub fn describe(settings: &Settings, path: &Path, format: OutputFormat) -> Result<String> {
    let table = OverrideTable::with_extra(&settings.overrides);
    let effective = EffectiveSettings {
        path: path.display().to_string(),
        file_present: path.exists(),
        settings,
        active_overrides: table.rules().len(),
    };

    if matches!(format, OutputFormat::Json) {
        return Ok(serde_json::to_string_pretty(&effective)?);
    }

    let mut lines = vec![
        "\n=== gpuprobe Settings ===\n".to_string(),
        format!(
            "File: {} ({})",
            effective.path,
            if effective.file_present { "loaded" } else { "not found, using defaults" }
        ),
        format!("Probe timeout: {}s", settings.probe_timeout_secs),
        format!("Process timeout: {}s", settings.process_timeout_secs),
        format!(
            "Pinned buffer: {}x{} f32 ({} bytes)",
            settings.pinned_buffer.rows,
            settings.pinned_buffer.cols,
            settings.pinned_buffer.bytes()
        ),
        format!("Driver libraries: {}", settings.driver_library_names.join(", ")),
        format!(
            "Platform driver library: {}",
            settings.platform_driver_library_path.display()
        ),
        format!("Kernel identity: {}", settings.kernel_version_path.display()),
        format!(
            "Virtualization markers: {}",
            settings.virtualization_markers.join(", ")
        ),
        format!(
            "Process monitor: {} {}",
            settings.process_monitor.program,
            settings.process_monitor.args.join(" ")
        ),
        "\n=== Environment Overrides ===".to_string(),
    ];
    for rule in table.rules() {
        lines.push(format!(
            "  {} -> {} = {} ({})",
            rule.signal, rule.probe, rule.status, rule.reason
        ));
    }
    Ok(lines.join("\n"))
}

/// Execute the config command
pub fn execute(settings: &Settings, path: &Path, format: OutputFormat) -> Result<()> {
    println!("{}", describe(settings, path, format)?);
    Ok(())
}
