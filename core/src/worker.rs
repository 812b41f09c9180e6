// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Worker loop
//!
//! Drives progress. The worker holds no durable state of its own — every
//! fact it needs is re-derived from the [`Store`] on each tick, so any
//! number of workers may run `run_once` concurrently against the same
//! backend (spec §5).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::domain::{CallOutcome, ExecutionId};
use crate::executor::{outcome_from_poll, Executor};
use crate::interpreter::InterpreterAdapter;
use crate::orchestrator::{Orchestrator, OrchestratorError};
use crate::store::Store;

pub struct WorkerLoop<S, I> {
    orchestrator: Arc<Orchestrator<S, I>>,
    executor: Arc<dyn Executor>,
    store: Arc<S>,
    poll_interval: Duration,
}

impl<S, I> WorkerLoop<S, I>
where
    S: Store + 'static,
    I: InterpreterAdapter + 'static,
{
    pub fn new(
        orchestrator: Arc<Orchestrator<S, I>>,
        executor: Arc<dyn Executor>,
        store: Arc<S>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            executor,
            store,
            poll_interval,
        }
    }

    /// The three worker-loop steps of spec §4.5, run once:
    /// 1. Claim one scheduled execution and advance it.
    /// 2. For each waiting execution whose batch is satisfied, resume it.
    /// 3. For executors that poll, refresh job statuses and feed completions
    ///    back through `complete_call`.
    pub async fn run_once(&self) -> Result<(), OrchestratorError> {
        if let Some(execution) = self.store.claim_scheduled().await? {
            debug!(execution_id = %execution.id, "advancing claimed execution");
            self.orchestrator.advance(execution.id).await?;
        }

        let waiting = self.store.list_waiting().await?;
        let mut job_handles = Vec::new();
        for execution in &waiting {
            let Some(resume_group_id) = execution.resume_group_id else {
                continue;
            };
            let status = self.store.batch_status(resume_group_id).await?;
            if status.is_fully_terminal() {
                self.orchestrator.resume(execution.id).await?;
                continue;
            }
            for call in self.store.get_calls(resume_group_id).await? {
                if !call.status.is_terminal() {
                    if let Some(job_handle) = call.job_handle {
                        job_handles.push((execution.id, call.call_id, job_handle));
                    }
                }
            }
        }

        self.refresh_polling_executor(&job_handles).await?;
        Ok(())
    }

    async fn refresh_polling_executor(&self, job_handles: &[(ExecutionId, i32, String)]) -> Result<(), OrchestratorError> {
        for (execution_id, call_id, job_handle) in job_handles {
            let Some(result) = self.executor.poll(job_handle).await else {
                // Push-only executor: completions arrive out of band via
                // the webhook endpoint, not through polling.
                continue;
            };
            match result {
                Ok(status) => {
                    if let Some(outcome) = outcome_from_poll(status) {
                        self.complete(*execution_id, *call_id, outcome).await?;
                    }
                }
                Err(e) => {
                    error!(execution_id = %execution_id, error = %e, "poll failed");
                }
            }
        }
        Ok(())
    }

    async fn complete(&self, execution_id: ExecutionId, call_id: i32, outcome: CallOutcome) -> Result<(), OrchestratorError> {
        self.orchestrator.complete_call(execution_id, call_id, outcome).await
    }

    /// Repeats `run_once` until there is no immediately actionable work
    /// left — scheduled, fully-satisfied-waiting, or currently pollable.
    /// Used by tests to drive a deterministic crash/restart scenario
    /// without a real timer (spec §8 scenario 6).
    pub async fn run_until_idle(&self) -> Result<(), OrchestratorError> {
        loop {
            let scheduled = self.store.claim_scheduled().await?;
            if let Some(execution) = scheduled {
                self.orchestrator.advance(execution.id).await?;
                continue;
            }

            let waiting = self.store.list_waiting().await?;
            let mut progressed = false;
            for execution in &waiting {
                if let Some(resume_group_id) = execution.resume_group_id {
                    let status = self.store.batch_status(resume_group_id).await?;
                    if status.is_fully_terminal() {
                        self.orchestrator.resume(execution.id).await?;
                        progressed = true;
                    }
                }
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    /// Runs forever on `poll_interval`, until `shutdown` is cancelled.
    pub async fn run_forever(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("worker loop shutting down");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "worker loop iteration failed");
                    }
                }
            }
        }
    }
}
