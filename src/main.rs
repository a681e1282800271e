// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! gpuprobe - GPU capability probe
//!
//! Entry point for the gpuprobe CLI.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    tty::IsTty,
    ExecutableCommand,
};

use gpuprobe::cli::{Cli, Commands};
use gpuprobe::commands;
use gpuprobe::config::Settings;
use gpuprobe::error::Result;
use gpuprobe::runner::{block_on_bounded, SHUTDOWN_GRACE};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so the report on stdout stays machine-readable.
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on probe diagnostics; `RUST_LOG` still takes precedence.
    if cli.verbose > 0 {
        if let Ok(parsed) = "gpuprobe=debug".parse() {
            env_filter = env_filter.add_directive(parsed);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_tty())
        .init();

    // A probe stuck in a native call must not hold the process open.
    match block_on_bounded(run(cli), SHUTDOWN_GRACE).and_then(|outcome| outcome) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e.to_string());
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load_from(&path)?;
    if let Some(secs) = cli.timeout {
        settings.probe_timeout_secs = secs;
    }
    settings.validate()?;

    if cli.verbose > 1 {
        eprintln!("[verbose:2] Settings: {:?}", settings);
    }

    match cli.command {
        None | Some(Commands::Check) => commands::check::execute(&settings, cli.format).await,
        Some(Commands::Config) => commands::config::execute(&settings, &path, cli.format),
    }
}

fn print_error(message: &str) {
    let mut stderr = io::stderr();
    let color = stderr.is_tty();
    if color {
        let _ = stderr.execute(SetForegroundColor(Color::Red));
    }
    let _ = write!(stderr, "error: ");
    if color {
        let _ = stderr.execute(ResetColor);
    }
    let _ = writeln!(stderr, "{message}");
}
