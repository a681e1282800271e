// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Capability report aggregation
//!
//! A [`CapabilityReport`] is built once per run from the ordered probe
//! results and the snapshot they were evaluated against. It is never
//! mutated afterwards.

mod overrides;
pub mod policy;
pub mod render;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::driver::DriverInfo;
use crate::environment::EnvironmentSignals;
use crate::probes::{ProbeContext, ProbeResult, ProbeStatus};
use crate::runtime::DeviceInfo;

pub use overrides::{EnvironmentSignal, OverrideRule, OverrideTable};

/// Feasibility of CPU-offloaded inference on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Eligible,
    NotEligible,
    Indeterminate,
}

impl Decision {
    pub fn description(&self) -> &'static str {
        match self {
            Decision::Eligible => "CPU offload is supported on this host",
            Decision::NotEligible => "CPU offload is not supported on this host",
            Decision::Indeterminate => "CPU offload support could not be determined",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Decision::Eligible => "ELIGIBLE",
            Decision::NotEligible => "NOT ELIGIBLE",
            Decision::Indeterminate => "INDETERMINATE",
        };
        f.write_str(label)
    }
}

/// Aggregated outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityReport {
    pub results: Vec<ProbeResult>,
    pub devices: Vec<DeviceInfo>,
    pub driver: DriverInfo,
    pub environment: EnvironmentSignals,
    pub decision: Decision,
    pub recommendations: Vec<String>,
    pub backend: String,
    pub generated_at: DateTime<Utc>,
}

impl CapabilityReport {
    /// Aggregate `results` against the snapshot they were produced from.
    pub fn build(ctx: &ProbeContext, results: Vec<ProbeResult>) -> Self {
        let decision = policy::decide(&results);
        let recommendations = policy::recommend(&results, decision);
        tracing::debug!(%decision, recommendations = recommendations.len(), "report built");

        Self {
            results,
            devices: ctx.devices.clone(),
            driver: ctx.driver.clone(),
            environment: ctx.environment.clone(),
            decision,
            recommendations,
            backend: ctx.runtime.backend().to_string(),
            generated_at: Utc::now(),
        }
    }

    pub fn result(&self, name: &str) -> Option<&ProbeResult> {
        self.results.iter().find(|r| r.name() == name)
    }

    pub fn status_of(&self, name: &str) -> Option<ProbeStatus> {
        self.result(name).map(|r| r.status())
    }

    /// Count of results per status, in `Pass, Warning, Fail, NotApplicable` order.
    pub fn tally(&self) -> [(ProbeStatus, usize); 4] {
        let count = |status| self.results.iter().filter(|r| r.status() == status).count();
        [
            (ProbeStatus::Pass, count(ProbeStatus::Pass)),
            (ProbeStatus::Warning, count(ProbeStatus::Warning)),
            (ProbeStatus::Fail, count(ProbeStatus::Fail)),
            (ProbeStatus::NotApplicable, count(ProbeStatus::NotApplicable)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::test_support::{context, single_device};
    use crate::probes::{COMPUTE_CAPABILITY, MANAGED_MEMORY, PEER_ACCESS, PINNED_MEMORY};

    fn passing() -> Vec<ProbeResult> {
        vec![
            ProbeResult::pass(COMPUTE_CAPABILITY, ""),
            ProbeResult::pass(PINNED_MEMORY, ""),
            ProbeResult::pass(MANAGED_MEMORY, ""),
            ProbeResult::not_applicable(PEER_ACCESS, ""),
        ]
    }

    #[test]
    fn test_build_copies_snapshot() {
        let ctx = context(single_device());
        let report = CapabilityReport::build(&ctx, passing());
        assert_eq!(report.decision, Decision::Eligible);
        assert!(report.recommendations.is_empty());
        assert_eq!(report.devices.len(), 1);
        assert_eq!(report.backend, "simulated");
        assert_eq!(report.status_of(PEER_ACCESS), Some(ProbeStatus::NotApplicable));
        assert!(report.result("missing").is_none());
    }

    #[test]
    fn test_tally() {
        let report = CapabilityReport::build(&context(single_device()), passing());
        assert_eq!(report.tally()[0], (ProbeStatus::Pass, 3));
        assert_eq!(report.tally()[3], (ProbeStatus::NotApplicable, 1));
    }

    #[test]
    fn test_report_json_shape() {
        let report = CapabilityReport::build(&context(single_device()), passing());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["decision"], "eligible");
        assert!(json["generatedAt"].is_string());
        assert_eq!(json["results"][0]["name"], COMPUTE_CAPABILITY);
        assert_eq!(json["devices"][0]["computeMajor"], 8);
        assert_eq!(json["driver"]["versionMajor"], 12);
        assert_eq!(json["environment"]["isVirtualizedHostedKernel"], false);
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(Decision::NotEligible.to_string(), "NOT ELIGIBLE");
        assert_eq!(
            serde_json::to_string(&Decision::NotEligible).unwrap(),
            "\"not_eligible\""
        );
    }
}
