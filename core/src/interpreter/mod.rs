// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Interpreter adapter
//!
//! The sandboxed scripting dialect itself is an external collaborator — this
//! module only defines the boundary the orchestrator drives it through.
//! `start`/`resume` are synchronous and CPU-bound by contract: the
//! orchestrator is responsible for running them off the async executor
//! (`tokio::task::spawn_blocking`) if a real interpreter needs it.

use std::collections::HashMap;

use crate::domain::{CallOutcome, PendingCallRequest};

#[cfg(any(test, feature = "reference-interpreter"))]
pub mod reference;

#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    /// The user's code raised during `start` or a fresh top-level `resume`.
    #[error("interpreter error: {0}")]
    UserCode(String),
    /// The opaque snapshot could not be resumed (e.g. incompatible version).
    #[error("snapshot could not be resumed: {0}")]
    SnapshotIncompatible(String),
}

/// What the interpreter produced for one `start`/`resume` call.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The program ran to completion; `value` is its final structured
    /// result.
    Complete(serde_json::Value),
    /// The program suspended mid-expression. `state` is opaque and must be
    /// persisted verbatim; `pending_calls` is the batch of external calls it
    /// is waiting on (possibly empty — a degenerate suspend that resumes
    /// immediately).
    Suspended {
        state: Vec<u8>,
        pending_calls: Vec<PendingCallRequest>,
    },
}

/// The boundary between the orchestrator and the sandboxed scripting
/// dialect. Implementations must be safe to share across worker tasks;
/// individual calls are not required to run concurrently with each other
/// for the same snapshot (the orchestrator never calls `resume` twice for
/// the same execution concurrently, per the `waiting -> resuming` guard).
pub trait InterpreterAdapter: Send + Sync {
    /// Begin a fresh execution of `code` with the given `inputs`, restricted
    /// to calling only `allowed_functions`.
    fn start(
        &self,
        code: &str,
        inputs: Option<&serde_json::Value>,
        allowed_functions: &[String],
    ) -> Result<Outcome, InterpreterError>;

    /// Resume a previously suspended execution from `state`, handing back
    /// the results of every call in the batch it was suspended on, keyed by
    /// the interpreter-assigned `call_id`.
    fn resume(
        &self,
        state: &[u8],
        results: HashMap<i32, CallOutcome>,
    ) -> Result<Outcome, InterpreterError>;
}
