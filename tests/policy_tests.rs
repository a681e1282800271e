// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Properties of the compute classification and the decision policy.

use proptest::prelude::*;

use gpuprobe::probes::{
    evaluate_devices, ProbeResult, ProbeStatus, COMPUTE_CAPABILITY, MANAGED_MEMORY, PINNED_MEMORY,
};
use gpuprobe::report::policy::{decide, recommend};
use gpuprobe::runtime::{DeviceInfo, SimulatedRuntime};
use gpuprobe::Decision;

fn devices(majors: &[u32]) -> Vec<DeviceInfo> {
    majors
        .iter()
        .enumerate()
        .map(|(i, major)| SimulatedRuntime::device(i, *major, 0, 8 << 30))
        .collect()
}

fn status() -> impl Strategy<Value = ProbeStatus> {
    prop_oneof![
        Just(ProbeStatus::Pass),
        Just(ProbeStatus::Fail),
        Just(ProbeStatus::Warning),
        Just(ProbeStatus::NotApplicable),
    ]
}

fn gates(compute: ProbeStatus, pinned: ProbeStatus, managed: ProbeStatus) -> Vec<ProbeResult> {
    vec![
        ProbeResult::new(COMPUTE_CAPABILITY, compute, ""),
        ProbeResult::new(PINNED_MEMORY, pinned, ""),
        ProbeResult::new(MANAGED_MEMORY, managed, ""),
    ]
}

proptest! {
    #[test]
    fn all_uva_devices_pass(majors in prop::collection::vec(2u32..=10, 1..8)) {
        prop_assert_eq!(evaluate_devices(&devices(&majors)).status(), ProbeStatus::Pass);
    }

    #[test]
    fn no_uva_devices_fail(majors in prop::collection::vec(0u32..2, 1..8)) {
        prop_assert_eq!(evaluate_devices(&devices(&majors)).status(), ProbeStatus::Fail);
    }

    #[test]
    fn mixed_devices_warn(
        good in prop::collection::vec(2u32..=10, 1..4),
        bad in prop::collection::vec(0u32..2, 1..4),
    ) {
        let mut majors = good;
        majors.extend(bad);
        prop_assert_eq!(evaluate_devices(&devices(&majors)).status(), ProbeStatus::Warning);
    }

    #[test]
    fn mandatory_fail_is_never_eligible(other in status(), managed in status(), first in any::<bool>()) {
        let results = if first {
            gates(ProbeStatus::Fail, other, managed)
        } else {
            gates(other, ProbeStatus::Fail, managed)
        };
        prop_assert_eq!(decide(&results), Decision::NotEligible);
    }

    #[test]
    fn eligible_only_when_every_gate_passes(c in status(), p in status(), m in status()) {
        let results = gates(c, p, m);
        let all_pass = [c, p, m].iter().all(|s| *s == ProbeStatus::Pass);
        prop_assert_eq!(decide(&results) == Decision::Eligible, all_pass);
    }

    #[test]
    fn recommendations_are_deterministic_and_unique(c in status(), p in status(), m in status()) {
        let results = gates(c, p, m);
        let decision = decide(&results);
        let first = recommend(&results, decision);
        let second = recommend(&results, decision);
        prop_assert_eq!(&first, &second);

        let mut sorted = first.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(sorted.len(), first.len());
        prop_assert_eq!(first.is_empty(), decision == Decision::Eligible);
    }
}

#[test]
fn managed_fail_dominates_passing_mandatory_gates() {
    let results = gates(ProbeStatus::Pass, ProbeStatus::Pass, ProbeStatus::Fail);
    assert_eq!(decide(&results), Decision::NotEligible);
    let recs = recommend(&results, Decision::NotEligible);
    assert!(recs[0].contains("managed-memory-dependent"));
    assert!(recs.iter().any(|r| r.contains("quantized weights")));
}

#[test]
fn non_gate_probes_do_not_affect_decision() {
    let mut results = gates(ProbeStatus::Pass, ProbeStatus::Pass, ProbeStatus::Pass);
    results.push(ProbeResult::fail("driver_metadata", "timeout"));
    results.push(ProbeResult::warning("peer_access", "no links"));
    assert_eq!(decide(&results), Decision::Eligible);
}

#[test]
fn mixed_eligibility_example() {
    let result = evaluate_devices(&devices(&[3, 1]));
    assert_eq!(result.status(), ProbeStatus::Warning);
}
