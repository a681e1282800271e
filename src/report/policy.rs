// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Decision policy and remediation hints for the CPU-offload workload

use super::Decision;
use crate::probes::{ProbeResult, ProbeStatus, COMPUTE_CAPABILITY, MANAGED_MEMORY, PINNED_MEMORY};

/// Gates in the order they are evaluated and reported.
pub const GATES: [&str; 3] = [COMPUTE_CAPABILITY, PINNED_MEMORY, MANAGED_MEMORY];

const COMPUTE_RECOMMENDATIONS: &[&str] = &[
    "Run on a device with compute capability 2.0 or newer (UVA support required)",
    "Use quantized weights (AWQ/GPTQ) to reduce device memory pressure",
];

const PINNED_RECOMMENDATIONS: &[&str] = &[
    "Check that the process may lock host memory (ulimit -l / container memlock limits)",
    "Reduce the offload buffer size or free host memory before retrying",
    "Use quantized weights (AWQ/GPTQ) to reduce device memory pressure",
];

const MANAGED_RECOMMENDATIONS: &[&str] = &[
    "Disable managed-memory-dependent CPU offload mode (run without --cpu-offload if the model fits in device memory)",
    "Use quantized weights (AWQ/GPTQ) to reduce device memory pressure",
    "Use an engine without managed-memory dependency (legacy engine via --disable-v1)",
    "Use an engine with explicit host staging for CPU offload (e.g. llama.cpp)",
];

const INDETERMINATE_HINT: &str =
    "Inspect the warnings above; one or more required checks did not produce a definite result";

fn status_of(results: &[ProbeResult], name: &str) -> Option<ProbeStatus> {
    results.iter().find(|r| r.name() == name).map(|r| r.status())
}

/// Derive the decision from the result set.
///
/// 1. compute or pinned `Fail` is `NotEligible`
/// 2. managed `Fail` is `NotEligible`
/// 3. a gate that is missing, `NotApplicable` or `Warning` is `Indeterminate`
/// 4. all three `Pass` is `Eligible`
pub fn decide(results: &[ProbeResult]) -> Decision {
    let status = |name: &str| status_of(results, name);

    if status(COMPUTE_CAPABILITY) == Some(ProbeStatus::Fail)
        || status(PINNED_MEMORY) == Some(ProbeStatus::Fail)
    {
        return Decision::NotEligible;
    }
    if status(MANAGED_MEMORY) == Some(ProbeStatus::Fail) {
        return Decision::NotEligible;
    }
    if GATES.iter().all(|gate| status(*gate) == Some(ProbeStatus::Pass)) {
        Decision::Eligible
    } else {
        Decision::Indeterminate
    }
}

fn recommendations_for(gate: &str) -> &'static [&'static str] {
    match gate {
        COMPUTE_CAPABILITY => COMPUTE_RECOMMENDATIONS,
        PINNED_MEMORY => PINNED_RECOMMENDATIONS,
        MANAGED_MEMORY => MANAGED_RECOMMENDATIONS,
        _ => &[],
    }
}

/// Static remediation list for the failed gates, first occurrence kept.
pub fn recommend(results: &[ProbeResult], decision: Decision) -> Vec<String> {
    match decision {
        Decision::Eligible => Vec::new(),
        Decision::Indeterminate => vec![INDETERMINATE_HINT.to_string()],
        Decision::NotEligible => {
            let mut out: Vec<String> = Vec::new();
            let failed = GATES
                .iter()
                .filter(|gate| status_of(results, gate) == Some(ProbeStatus::Fail));
            for gate in failed {
                for hint in recommendations_for(gate) {
                    if !out.iter().any(|existing| existing == hint) {
                        out.push((*hint).to_string());
                    }
                }
            }
            out
        }
    }
}
