// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! gpuprobe - GPU capability probe for CPU-offloaded inference.
//!
//! Runs an ordered set of independent capability probes against the
//! accelerator runtime (compute capability, pinned memory, managed memory,
//! peer access, host environment, driver library and metadata) and
//! aggregates them into a single feasibility decision.
//!
//! Architecture highlights:
//! - `runtime`: the accelerator seam, with a CUDA driver backend and a
//!   deterministic simulated one
//! - `driver`, `environment`: native driver version and host signals
//! - `probes`, `runner`: the probe contract and its sequential executor
//! - `report`: override table, decision policy and rendering
//! - `pipeline`: wiring from enumeration to report

pub mod cli;
pub mod commands;
pub mod config;
pub mod driver;
pub mod environment;
pub mod error;
pub mod pipeline;
pub mod probes;
pub mod report;
pub mod runner;
pub mod runtime;

pub use error::{ProbeError, Result};
pub use pipeline::Pipeline;
pub use report::{CapabilityReport, Decision};
