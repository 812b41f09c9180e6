// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Store
//!
//! Transactional persistence of [`Execution`]s and [`Call`]s. Every
//! operation that the state machine (§4.4) requires to be atomic is
//! implemented here as a single conditional write; callers never need to
//! hold their own lock across a `Store` call.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::{Call, CallOutcome, Execution, ExecutionId, PendingCallRequest, ResumeGroupId};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("execution {0} not found")]
    ExecutionNotFound(ExecutionId),
    #[error("call {execution_id}/{resume_group_id}/{call_id} not found")]
    CallNotFound {
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
    },
    /// A conditional transition lost its race. Per spec §7 item 4, this is
    /// benign: the caller treats it as a no-op, another worker is already
    /// handling the transition.
    #[error("conditional transition conflict on execution {0}")]
    Conflict(ExecutionId),
    /// A call was already terminal with a different outcome than the one
    /// now being reported.
    #[error("call {execution_id}/{resume_group_id}/{call_id} already terminal with a different outcome")]
    OutcomeConflict {
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
    },
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Aggregate counts over one resume group, used to decide whether a batch
/// is fully satisfied (spec §4.2 `batch_status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStatus {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending_or_running: usize,
}

impl BatchStatus {
    /// `save_suspension` inserts every call in the batch atomically with the
    /// `waiting` transition, so a `waiting` execution always has its
    /// (possibly empty) batch fully present — a degenerate zero-call batch
    /// (spec §4.4: "resumes immediately without waiting") is vacuously
    /// fully terminal, not stuck pending forever.
    pub fn is_fully_terminal(&self) -> bool {
        self.pending_or_running == 0
    }
}

/// Selects which backend an embedding application wires up at startup.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    Postgres { connection_string: String },
}

/// Transactional persistence of executions and their pending calls. See
/// module docs and spec §4.2 for the exact contract each operation must
/// uphold.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_execution(
        &self,
        code: String,
        allowed_functions: Vec<String>,
        inputs: Option<serde_json::Value>,
    ) -> Result<Execution, StoreError>;

    /// Atomically transition one scheduled execution to running, or return
    /// `None` if there is none. Used by the worker to avoid double
    /// processing (spec §4.4: "at most one worker").
    async fn claim_scheduled(&self) -> Result<Option<Execution>, StoreError>;

    /// In one transaction: verify `execution_id`'s current status equals
    /// `expected_status`, persist `state_bytes`, set
    /// `current_resume_group_id`, set status = waiting, and insert every
    /// `Call` row as pending. Fails with [`StoreError::Conflict`] if the
    /// status has changed underneath the caller.
    async fn save_suspension(
        &self,
        execution_id: ExecutionId,
        expected_status: crate::domain::ExecutionStatus,
        state_bytes: Vec<u8>,
        resume_group_id: ResumeGroupId,
        calls: Vec<PendingCallRequest>,
    ) -> Result<(), StoreError>;

    /// Atomic transition of one call from `{pending, running}` to
    /// `{completed, failed}`. Idempotent: a repeat of the same outcome
    /// succeeds silently; a conflicting outcome returns
    /// [`StoreError::OutcomeConflict`].
    async fn complete_call(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        outcome: CallOutcome,
    ) -> Result<(), StoreError>;

    async fn batch_status(&self, resume_group_id: ResumeGroupId) -> Result<BatchStatus, StoreError>;

    /// Conditionally transition an execution from waiting to resuming iff
    /// `current_resume_group_id` matches and every call in the batch is
    /// terminal. Returns `true` exactly once across concurrent callers.
    async fn claim_resume(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
    ) -> Result<bool, StoreError>;

    /// Load everything a resume needs: the suspended state and the results
    /// of every call in the batch being resumed.
    async fn load_for_resume(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
    ) -> Result<(Vec<u8>, std::collections::HashMap<i32, CallOutcome>), StoreError>;

    /// Terminal transition to completed or failed.
    async fn finish(
        &self,
        execution_id: ExecutionId,
        result: Result<serde_json::Value, String>,
    ) -> Result<(), StoreError>;

    async fn get_execution(&self, execution_id: ExecutionId) -> Result<Execution, StoreError>;

    /// All calls belonging to one resume group, in `call_id` order.
    async fn get_calls(&self, resume_group_id: ResumeGroupId) -> Result<Vec<Call>, StoreError>;

    /// Every execution currently in `waiting` whose batch may now be
    /// complete. The worker loop evaluates `batch_status` for each.
    async fn list_waiting(&self) -> Result<Vec<Execution>, StoreError>;

    /// Resolve a pushed webhook's `job_id` back to the call it belongs to
    /// (spec §6: `POST /webhook/complete`).
    async fn find_call_by_job_handle(
        &self,
        job_handle: &str,
    ) -> Result<Option<(ExecutionId, ResumeGroupId, i32)>, StoreError>;

    /// Record the job handle an executor assigned to a freshly submitted
    /// call, so a later push/poll can be matched back to it.
    async fn set_job_handle(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        job_handle: String,
    ) -> Result<(), StoreError>;
}
