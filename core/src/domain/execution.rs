// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Execution aggregate
//!
//! An `Execution` is the durable record of one running (or finished) program.
//! It owns the interpreter's opaque suspended state and moves through the
//! state machine: `scheduled -> running -> waiting -> resuming -> running ->
//! {completed | failed}`.
//!
//! # Architectural Context
//! Bounded Context: Orchestration
//! Aggregate Root: Execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier for an [`Execution`]. Opaque outside this crate other than its
/// string/UUID representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ExecutionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A resume group batches every `Call` suspended at the same interpreter
/// checkpoint. Generated once by [`crate::store::Store::save_suspension`],
/// never by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumeGroupId(pub Uuid);

impl ResumeGroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResumeGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResumeGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an [`Execution`] in the state machine (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Scheduled,
    Running,
    Waiting,
    Resuming,
    Completed,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Scheduled => "scheduled",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Waiting => "waiting",
            ExecutionStatus::Resuming => "resuming",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("execution {0} is already in a terminal state ({1})")]
    AlreadyTerminal(ExecutionId, ExecutionStatus),
    #[error("invalid transition for execution {id}: {from} -> {to}")]
    InvalidTransition {
        id: ExecutionId,
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
}

/// The durable record of one program run.
///
/// `state` is the interpreter's opaque snapshot (spec §3) — this crate never
/// inspects its bytes, only persists and hands them back to the
/// [`crate::interpreter::InterpreterAdapter`] that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub code: String,
    pub status: ExecutionStatus,
    pub inputs: Option<serde_json::Value>,
    pub allowed_functions: Vec<String>,
    pub state: Option<Vec<u8>>,
    pub resume_group_id: Option<ResumeGroupId>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// Construct a freshly scheduled execution. Does not touch the store —
    /// callers persist it via [`crate::store::Store::create_execution`].
    pub fn new(code: String, inputs: Option<serde_json::Value>, allowed_functions: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId::new(),
            code,
            status: ExecutionStatus::Scheduled,
            inputs,
            allowed_functions,
            state: None,
            resume_group_id: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition `scheduled -> running`, invoked right before the
    /// interpreter's `start` is called.
    pub fn mark_running(&mut self) -> Result<(), ExecutionError> {
        self.transition_to(ExecutionStatus::Running)
    }

    /// Transition `running|resuming -> waiting`, recording the suspended
    /// state and the resume group awaiting completion.
    pub fn mark_waiting(&mut self, state: Vec<u8>, resume_group_id: ResumeGroupId) -> Result<(), ExecutionError> {
        self.transition_to(ExecutionStatus::Waiting)?;
        self.state = Some(state);
        self.resume_group_id = Some(resume_group_id);
        Ok(())
    }

    /// Transition `waiting -> resuming`, claimed by exactly one worker.
    pub fn mark_resuming(&mut self) -> Result<(), ExecutionError> {
        self.transition_to(ExecutionStatus::Resuming)
    }

    pub fn mark_completed(&mut self, result: serde_json::Value) -> Result<(), ExecutionError> {
        self.transition_to(ExecutionStatus::Completed)?;
        self.result = Some(result);
        self.state = None;
        self.resume_group_id = None;
        Ok(())
    }

    pub fn mark_failed(&mut self, error: String) -> Result<(), ExecutionError> {
        if self.is_terminal() {
            return Err(ExecutionError::AlreadyTerminal(self.id, self.status));
        }
        self.status = ExecutionStatus::Failed;
        self.error = Some(error);
        self.state = None;
        self.resume_group_id = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn transition_to(&mut self, to: ExecutionStatus) -> Result<(), ExecutionError> {
        let valid = matches!(
            (self.status, to),
            (ExecutionStatus::Scheduled, ExecutionStatus::Running)
                | (ExecutionStatus::Running, ExecutionStatus::Waiting)
                | (ExecutionStatus::Running, ExecutionStatus::Completed)
                | (ExecutionStatus::Resuming, ExecutionStatus::Waiting)
                | (ExecutionStatus::Resuming, ExecutionStatus::Completed)
                | (ExecutionStatus::Waiting, ExecutionStatus::Resuming)
        );
        if !valid {
            return Err(ExecutionError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_ids_are_unique() {
        let a = ExecutionId::new();
        let b = ExecutionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn new_execution_starts_scheduled() {
        let exec = Execution::new("1 + 1".into(), None, vec![]);
        assert_eq!(exec.status, ExecutionStatus::Scheduled);
        assert!(exec.state.is_none());
        assert!(!exec.is_terminal());
    }

    #[test]
    fn scheduled_to_running_is_valid() {
        let mut exec = Execution::new("1 + 1".into(), None, vec![]);
        exec.mark_running().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Running);
    }

    #[test]
    fn running_to_completed_sets_result_and_clears_state() {
        let mut exec = Execution::new("1 + 1".into(), None, vec![]);
        exec.mark_running().unwrap();
        exec.mark_completed(serde_json::json!(2)).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.result, Some(serde_json::json!(2)));
        assert!(exec.state.is_none());
    }

    #[test]
    fn running_to_waiting_records_state_and_resume_group() {
        let mut exec = Execution::new("gather(a(), b())".into(), None, vec![]);
        exec.mark_running().unwrap();
        let rg = ResumeGroupId::new();
        exec.mark_waiting(vec![1, 2, 3], rg).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Waiting);
        assert_eq!(exec.state, Some(vec![1, 2, 3]));
        assert_eq!(exec.resume_group_id, Some(rg));
    }

    #[test]
    fn waiting_to_resuming_to_waiting_again_is_valid_for_nested_gathers() {
        let mut exec = Execution::new("nested".into(), None, vec![]);
        exec.mark_running().unwrap();
        let rg1 = ResumeGroupId::new();
        exec.mark_waiting(vec![1], rg1).unwrap();
        exec.mark_resuming().unwrap();
        let rg2 = ResumeGroupId::new();
        exec.mark_waiting(vec![2], rg2).unwrap();
        assert_eq!(exec.resume_group_id, Some(rg2));
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut exec = Execution::new("1 + 1".into(), None, vec![]);
        // scheduled -> waiting directly is not a valid transition.
        let err = exec.mark_resuming().unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidTransition { .. }));
    }

    #[test]
    fn mark_failed_from_terminal_state_errors() {
        let mut exec = Execution::new("1 + 1".into(), None, vec![]);
        exec.mark_running().unwrap();
        exec.mark_completed(serde_json::json!(1)).unwrap();
        let err = exec.mark_failed("boom".into()).unwrap_err();
        assert!(matches!(err, ExecutionError::AlreadyTerminal(_, _)));
    }

    #[test]
    fn mark_failed_clears_suspended_state() {
        let mut exec = Execution::new("gather(a())".into(), None, vec![]);
        exec.mark_running().unwrap();
        exec.mark_waiting(vec![9], ResumeGroupId::new()).unwrap();
        exec.mark_resuming().unwrap();
        exec.mark_failed("interpreter error".into()).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(exec.state.is_none());
        assert!(exec.resume_group_id.is_none());
        assert_eq!(exec.error.as_deref(), Some("interpreter error"));
    }
}
