// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Executor
//!
//! Pluggable dispatch for individual calls. The orchestrator only ever sees
//! this trait; it never knows whether a call ran in-process, on a task
//! queue, or on a remote worker reached over a webhook.

pub mod local;
pub mod push;
pub mod registry;
pub mod task_queue;

use async_trait::async_trait;

pub use local::LocalExecutor;
pub use push::PushExecutor;
pub use registry::FunctionRegistry;
pub use task_queue::{InProcessQueue, TaskQueueExecutor};

use crate::domain::{Call, CallOutcome, ExecutionId, ResumeGroupId};

/// The narrow slice of the orchestrator an executor needs: a place to
/// deposit a call's outcome once it is known. Implemented by
/// [`crate::orchestrator::Orchestrator`]; kept as its own trait so this
/// module does not need to depend on the orchestrator's concrete, store- and
/// interpreter-generic type.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn complete_call(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        outcome: CallOutcome,
    );
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("function '{0}' is not registered with this executor")]
    UnknownFunction(String),
    #[error("call submission failed: {0}")]
    Submission(String),
}

/// What `poll` reports for one previously submitted call.
#[derive(Debug, Clone)]
pub enum PollStatus {
    Pending,
    Completed(serde_json::Value),
    Failed(String),
}

/// Diagnostic counters, purely observational — never consulted by the
/// orchestrator's state machine.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    pub submitted: std::sync::atomic::AtomicU64,
    pub completed: std::sync::atomic::AtomicU64,
    pub failed: std::sync::atomic::AtomicU64,
}

impl ExecutorStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        use std::sync::atomic::Ordering::Relaxed;
        (
            self.submitted.load(Relaxed),
            self.completed.load(Relaxed),
            self.failed.load(Relaxed),
        )
    }
}

/// Dispatches one [`Call`] and reports its outcome, either via `poll` or by
/// having pushed it directly back through [`crate::orchestrator::Orchestrator::complete_call`].
#[async_trait]
pub trait Executor: Send + Sync {
    /// Submit a call for execution, returning an executor-assigned job
    /// handle. On failure, the caller treats this as an immediate call
    /// failure (spec §7 item 3) — `Executor` implementations never mutate
    /// the `Store` themselves.
    async fn submit(&self, call: &Call) -> Result<String, ExecutorError>;

    /// Poll a previously submitted job. Executors that only ever push
    /// completions (e.g. [`PushExecutor`]) return `None`, declaring
    /// themselves push-only; the worker loop then skips them during its
    /// polling step.
    async fn poll(&self, _job_handle: &str) -> Option<Result<PollStatus, ExecutorError>> {
        None
    }

    fn stats(&self) -> &ExecutorStats;
}

pub(crate) fn outcome_from_poll(status: PollStatus) -> Option<CallOutcome> {
    match status {
        PollStatus::Pending => None,
        PollStatus::Completed(v) => Some(CallOutcome::Completed(v)),
        PollStatus::Failed(e) => Some(CallOutcome::Failed(e)),
    }
}
