// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Call entity
//!
//! A `Call` is one external function invocation suspended on by an
//! [`crate::domain::execution::Execution`]. Calls belong to exactly one
//! resume group (the batch they were emitted as part of) and are terminated
//! exactly once, by [`crate::store::Store::complete_call`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::execution::{ExecutionId, ResumeGroupId};

/// Dense, store-assigned identifier for a [`Call`] row. Distinct from
/// `call_id`, which is the interpreter-assigned slot within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallRowId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Failed)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallStatus::Pending => "pending",
            CallStatus::Running => "running",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// The pending external call a suspended interpreter is waiting on,
/// surfaced by [`crate::interpreter::Outcome::Suspended`] and persisted
/// verbatim by [`crate::store::Store::save_suspension`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCallRequest {
    pub call_id: i32,
    pub function_name: String,
    pub args: serde_json::Value,
}

/// A durable record of one external function invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: CallRowId,
    pub execution_id: ExecutionId,
    pub resume_group_id: ResumeGroupId,
    pub call_id: i32,
    pub function_name: String,
    pub args: serde_json::Value,
    pub status: CallStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub job_handle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Call {
    pub fn new_pending(
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        request: PendingCallRequest,
    ) -> Self {
        Self {
            id: CallRowId(0),
            execution_id,
            resume_group_id,
            call_id: request.call_id,
            function_name: request.function_name,
            args: request.args,
            status: CallStatus::Pending,
            result: None,
            error: None,
            job_handle: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// The outcome of one external call, handed back to the interpreter on
/// resume and recorded on the [`Call`] row by `complete_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallOutcome {
    Completed(serde_json::Value),
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ids() -> (ExecutionId, ResumeGroupId) {
        (ExecutionId(Uuid::new_v4()), ResumeGroupId(Uuid::new_v4()))
    }

    #[test]
    fn new_pending_call_starts_pending_with_no_outcome() {
        let (exec_id, rg) = ids();
        let call = Call::new_pending(
            exec_id,
            rg,
            PendingCallRequest {
                call_id: 0,
                function_name: "process".into(),
                args: serde_json::json!(["a"]),
            },
        );
        assert_eq!(call.status, CallStatus::Pending);
        assert!(call.result.is_none());
        assert!(call.error.is_none());
        assert!(!call.status.is_terminal());
    }

    #[test]
    fn terminal_statuses_are_recognized() {
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(!CallStatus::Pending.is_terminal());
        assert!(!CallStatus::Running.is_terminal());
    }
}
