// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// gpuprobe - GPU capability probe for CPU-offloaded inference
#[derive(Parser, Debug)]
#[command(name = "gpuprobe")]
#[command(
    version,
    about = "Probe GPU capabilities and decide whether CPU-offloaded inference can run"
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file (defaults to ~/.gpuprobe/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Per-probe timeout in seconds (overrides probe_timeout_secs)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run all probes and print the capability report (default)
    Check,

    /// Print the effective settings and where they were loaded from
    Config,
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Sectioned plain text
    #[default]
    Text,

    /// Serialized capability report
    Json,
}
