// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Sequential probe runner
//!
//! Runs each registered probe on the blocking pool under a timeout, one at a
//! time, then passes the result through the override table. The returned
//! list always has one entry per probe, in registration order.
//!
//! A timed-out probe cannot be cancelled while it sits in a native call. Until
//! it returns, later probes that would call into the accelerator runtime are
//! recorded as failed instead of running alongside it.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;

use crate::error::Result;
use crate::probes::{default_probes, Probe, ProbeContext, ProbeResult};
use crate::report::OverrideTable;

/// Message recorded when a probe exceeds its time budget.
pub const TIMEOUT_MESSAGE: &str = "timeout";

/// Message recorded for a runtime probe skipped behind a stalled one.
pub const RUNTIME_BUSY_MESSAGE: &str = "runtime busy: earlier probe timed out";

/// How long process shutdown waits for abandoned blocking work.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Drive `future` on a fresh multi-thread runtime.
///
/// Shutdown waits at most `grace` for blocking tasks still running (a probe
/// stuck in a native call), so a hung call never keeps the process alive.
pub fn block_on_bounded<F: Future>(future: F, grace: Duration) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

/// A probe that outlived its timeout while holding the runtime.
struct Stalled {
    probe: &'static str,
    task: JoinHandle<ProbeResult>,
}

pub struct ProbeRunner {
    probes: Vec<Arc<dyn Probe>>,
    overrides: OverrideTable,
    timeout: Duration,
}

impl ProbeRunner {
    pub fn new(probes: Vec<Arc<dyn Probe>>, overrides: OverrideTable, timeout: Duration) -> Self {
        Self {
            probes,
            overrides,
            timeout,
        }
    }

    /// Built-in probes with the built-in overrides.
    pub fn with_defaults(timeout: Duration) -> Self {
        Self::new(default_probes(), OverrideTable::builtin(), timeout)
    }

    pub fn probe_names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    pub async fn run(&self, ctx: Arc<ProbeContext>) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(self.probes.len());
        let mut stalled: Option<Stalled> = None;

        for probe in &self.probes {
            if let Some(done) = stalled.as_ref().filter(|s| s.task.is_finished()) {
                tracing::debug!(probe = done.probe, "stalled probe returned, runtime free");
                stalled = None;
            }

            let uses_runtime = probe.uses_runtime(&ctx);
            let blocked_by = stalled.as_ref().map(|s| s.probe).filter(|_| uses_runtime);

            let result = match blocked_by {
                Some(blocker) => {
                    tracing::warn!(
                        probe = probe.name(),
                        blocked_by = blocker,
                        "runtime busy, probe skipped"
                    );
                    ProbeResult::fail(probe.name(), RUNTIME_BUSY_MESSAGE)
                        .with_detail("blocked_by", blocker)
                }
                None => {
                    let (result, abandoned) =
                        self.run_one(Arc::clone(probe), Arc::clone(&ctx)).await;
                    if let Some(task) = abandoned.filter(|_| uses_runtime) {
                        stalled = Some(Stalled {
                            probe: probe.name(),
                            task,
                        });
                    }
                    result
                }
            };
            results.push(self.overrides.apply(result, &ctx.environment));
        }
        results
    }

    /// Run one probe. A timed-out probe also hands back its still-running task.
    async fn run_one(
        &self,
        probe: Arc<dyn Probe>,
        ctx: Arc<ProbeContext>,
    ) -> (ProbeResult, Option<JoinHandle<ProbeResult>>) {
        let name = probe.name();
        tracing::debug!(probe = name, "probe started");

        let mut task = tokio::task::spawn_blocking(move || probe.run(&ctx));
        let (result, abandoned) = match timeout(self.timeout, &mut task).await {
            Ok(Ok(result)) => (result, None),
            Ok(Err(join_error)) => {
                let reason = join_failure(join_error);
                tracing::error!(probe = name, %reason, "probe panicked");
                (ProbeResult::fail(name, format!("probe panicked: {reason}")), None)
            }
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                tracing::warn!(probe = name, timeout_ms, "probe timed out");
                let result =
                    ProbeResult::fail(name, TIMEOUT_MESSAGE).with_detail("timeout_ms", timeout_ms);
                (result, Some(task))
            }
        };

        tracing::debug!(probe = name, status = %result.status(), "probe finished");
        (result, abandoned)
    }
}

fn join_failure(error: JoinError) -> String {
    if error.is_panic() {
        panic_message(error.into_panic())
    } else {
        error.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
