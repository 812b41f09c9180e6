// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Orchestrator
//!
//! Stateless façade over [`Store`] + [`InterpreterAdapter`], generalized
//! over the concrete backend and interpreter so tests can swap both for an
//! [`crate::store::InMemoryStore`] and
//! [`crate::interpreter::reference::ReferenceInterpreter`]. Every operation
//! here is short and idempotent under retry, per spec §4.4.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::{
    Call, CallOutcome, Execution, ExecutionId, ExecutionStatus, PendingCallRequest, ResumeGroupId,
};
use crate::executor::{CompletionSink, Executor, FunctionRegistry, LocalExecutor};
use crate::interpreter::{InterpreterAdapter, InterpreterError, Outcome};
use crate::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Interpreter(#[from] InterpreterError),
    #[error("execution {0} has no current batch to resume")]
    NoCurrentBatch(ExecutionId),
    #[error("execution {0} is not yet terminal")]
    NotTerminal(ExecutionId),
}

/// One pending call as surfaced to embedding callers (spec §6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PendingCallView {
    pub call_id: i32,
    pub function_name: String,
    pub args: serde_json::Value,
}

/// The `poll(execution_id)` response shape (spec §6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionPoll {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub pending_calls: Vec<PendingCallView>,
}

pub struct Orchestrator<S, I> {
    store: Arc<S>,
    interpreter: Arc<I>,
    executor: Arc<dyn Executor>,
}

impl<S, I> Orchestrator<S, I>
where
    S: Store + 'static,
    I: InterpreterAdapter + 'static,
{
    pub fn new(store: Arc<S>, interpreter: Arc<I>, executor: Arc<dyn Executor>) -> Self {
        Self {
            store,
            interpreter,
            executor,
        }
    }

    /// The executor this orchestrator dispatches calls through. Exposed so
    /// a [`crate::worker::WorkerLoop`] built alongside it can drive the
    /// same executor's polling step (spec §4.5 step 3) without the
    /// orchestrator itself needing a `poll` method on its own API.
    pub fn executor(&self) -> Arc<dyn Executor> {
        self.executor.clone()
    }

    /// Convenience constructor for the common case of a [`LocalExecutor`]:
    /// the executor needs to call back into the orchestrator it is wired
    /// into, which would otherwise be a construction-order cycle. Resolved
    /// with `Arc::new_cyclic` so the executor only ever holds a `Weak`
    /// handle back to this orchestrator.
    pub fn new_with_local_executor(store: Arc<S>, interpreter: Arc<I>, registry: FunctionRegistry) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let sink: Arc<dyn CompletionSink> = Arc::new(WeakCompletionSink(weak.clone()));
            let executor: Arc<dyn Executor> = Arc::new(LocalExecutor::new(registry, sink));
            Self {
                store,
                interpreter,
                executor,
            }
        })
    }

    /// Creates the row with status=scheduled and returns. Does not invoke
    /// the interpreter.
    pub async fn start_execution(
        &self,
        code: String,
        allowed_functions: Vec<String>,
        inputs: Option<serde_json::Value>,
    ) -> Result<ExecutionId, OrchestratorError> {
        let execution = self.store.create_execution(code, allowed_functions, inputs).await?;
        info!(execution_id = %execution.id, "execution scheduled");
        Ok(execution.id)
    }

    /// Invokes `interpreter.start` for an execution already transitioned to
    /// `running` by [`Store::claim_scheduled`] and applies the resulting
    /// `Outcome`. No-op if the execution is not currently running (e.g. a
    /// concurrent caller already advanced it).
    pub async fn advance(&self, execution_id: ExecutionId) -> Result<(), OrchestratorError> {
        let execution = self.store.get_execution(execution_id).await?;
        if execution.status != ExecutionStatus::Running {
            debug!(execution_id = %execution_id, status = %execution.status, "advance: no-op, not running");
            return Ok(());
        }

        let outcome = self.interpreter.start(
            &execution.code,
            execution.inputs.as_ref(),
            &execution.allowed_functions,
        );
        self.apply_outcome(execution_id, ExecutionStatus::Running, outcome).await
    }

    /// Attempts `claim_resume`; on success, drives the interpreter past the
    /// now-complete batch and applies the resulting `Outcome`. Idempotent at
    /// the claim step — only one caller proceeds.
    pub async fn resume(&self, execution_id: ExecutionId) -> Result<(), OrchestratorError> {
        let execution = self.store.get_execution(execution_id).await?;
        let Some(resume_group_id) = execution.resume_group_id else {
            return Err(OrchestratorError::NoCurrentBatch(execution_id));
        };
        if execution.status != ExecutionStatus::Waiting {
            return Ok(());
        }

        let claimed = self.store.claim_resume(execution_id, resume_group_id).await?;
        if !claimed {
            debug!(execution_id = %execution_id, "resume: lost the claim, another worker is handling it");
            return Ok(());
        }

        let (state, results) = self.store.load_for_resume(execution_id, resume_group_id).await?;
        let outcome = self.interpreter.resume(&state, results);
        self.apply_outcome(execution_id, ExecutionStatus::Resuming, outcome).await
    }

    /// Records one call's outcome. Does not itself drive resume; the worker
    /// loop observes the batch becoming complete and drives the transition.
    pub async fn complete_call(
        &self,
        execution_id: ExecutionId,
        call_id: i32,
        outcome: CallOutcome,
    ) -> Result<(), OrchestratorError> {
        let execution = self.store.get_execution(execution_id).await?;
        let Some(resume_group_id) = execution.resume_group_id else {
            // Spec §9 open question: accepted-but-inert if the batch is no
            // longer current. Since we don't know which batch this call
            // belonged to without a resume_group_id on hand, this call has
            // nothing live to target; treat as benign.
            warn!(execution_id = %execution_id, "complete_call for execution with no current batch, ignoring");
            return Ok(());
        };
        match self
            .store
            .complete_call(execution_id, resume_group_id, call_id, outcome)
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn poll_one(&self, execution_id: ExecutionId) -> Result<ExecutionPoll, OrchestratorError> {
        let execution = self.store.get_execution(execution_id).await?;
        self.to_poll_view(execution).await
    }

    pub async fn poll_all(&self) -> Result<Vec<ExecutionPoll>, OrchestratorError> {
        let waiting = self.store.list_waiting().await?;
        let mut out = Vec::with_capacity(waiting.len());
        for execution in waiting {
            out.push(self.to_poll_view(execution).await?);
        }
        Ok(out)
    }

    pub async fn get_pending_calls(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<PendingCallView>, OrchestratorError> {
        let execution = self.store.get_execution(execution_id).await?;
        self.pending_calls_for(&execution).await
    }

    /// Error if non-terminal or failed.
    pub async fn get_result(&self, execution_id: ExecutionId) -> Result<serde_json::Value, OrchestratorError> {
        let execution = self.store.get_execution(execution_id).await?;
        match execution.status {
            ExecutionStatus::Completed => Ok(execution.result.unwrap_or(serde_json::Value::Null)),
            _ => Err(OrchestratorError::NotTerminal(execution_id)),
        }
    }

    async fn to_poll_view(&self, execution: Execution) -> Result<ExecutionPoll, OrchestratorError> {
        let pending_calls = self.pending_calls_for(&execution).await?;
        Ok(ExecutionPoll {
            execution_id: execution.id,
            status: execution.status,
            output: execution.result,
            error: execution.error,
            pending_calls,
        })
    }

    async fn pending_calls_for(&self, execution: &Execution) -> Result<Vec<PendingCallView>, OrchestratorError> {
        let Some(resume_group_id) = execution.resume_group_id else {
            return Ok(Vec::new());
        };
        let calls = self.store.get_calls(resume_group_id).await?;
        Ok(calls
            .into_iter()
            .filter(|c| !c.status.is_terminal())
            .map(|c| PendingCallView {
                call_id: c.call_id,
                function_name: c.function_name,
                args: c.args,
            })
            .collect())
    }

    /// Apply an `Outcome` under the transition table of spec §4.4,
    /// submitting any freshly created batch's calls to the executor.
    async fn apply_outcome(
        &self,
        execution_id: ExecutionId,
        expected_status: ExecutionStatus,
        outcome: Result<Outcome, InterpreterError>,
    ) -> Result<(), OrchestratorError> {
        match outcome {
            Err(e) => {
                match self.store.finish(execution_id, Err(e.to_string())).await {
                    Ok(()) | Err(StoreError::Conflict(_)) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Ok(Outcome::Complete(value)) => {
                match self.store.finish(execution_id, Ok(value)).await {
                    Ok(()) | Err(StoreError::Conflict(_)) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Ok(Outcome::Suspended { state, pending_calls }) => {
                let resume_group_id = ResumeGroupId::new();
                if pending_calls.is_empty() {
                    // Degenerate suspend (spec §4.4 note): resume immediately
                    // rather than waiting on an empty batch.
                    match self
                        .store
                        .save_suspension(execution_id, expected_status, state, resume_group_id, vec![])
                        .await
                    {
                        Ok(()) => return Box::pin(self.resume(execution_id)).await,
                        Err(StoreError::Conflict(_)) => return Ok(()),
                        Err(e) => return Err(e.into()),
                    }
                }
                self.save_and_dispatch(execution_id, expected_status, state, resume_group_id, pending_calls)
                    .await
            }
        }
    }

    async fn save_and_dispatch(
        &self,
        execution_id: ExecutionId,
        expected_status: ExecutionStatus,
        state: Vec<u8>,
        resume_group_id: ResumeGroupId,
        pending_calls: Vec<PendingCallRequest>,
    ) -> Result<(), OrchestratorError> {
        match self
            .store
            .save_suspension(execution_id, expected_status, state, resume_group_id, pending_calls.clone())
            .await
        {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        for request in pending_calls {
            let call = Call::new_pending(execution_id, resume_group_id, request);
            match self.executor.submit(&call).await {
                Ok(job_handle) => {
                    self.store
                        .set_job_handle(execution_id, resume_group_id, call.call_id, job_handle)
                        .await?;
                }
                Err(e) => {
                    // Executor submission error (spec §7 item 3): treated as
                    // an immediate call failure, never surfaced to the caller.
                    let result = self
                        .store
                        .complete_call(
                            execution_id,
                            resume_group_id,
                            call.call_id,
                            CallOutcome::Failed(e.to_string()),
                        )
                        .await;
                    if let Err(StoreError::Conflict(_)) = result {
                        // benign
                    } else {
                        result?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S, I> CompletionSink for Orchestrator<S, I>
where
    S: Store + 'static,
    I: InterpreterAdapter + 'static,
{
    async fn complete_call(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        outcome: CallOutcome,
    ) {
        match self.store.complete_call(execution_id, resume_group_id, call_id, outcome).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {}
            Err(e) => warn!(execution_id = %execution_id, error = %e, "complete_call failed"),
        }
    }
}

struct WeakCompletionSink<S, I>(std::sync::Weak<Orchestrator<S, I>>);

#[async_trait]
impl<S, I> CompletionSink for WeakCompletionSink<S, I>
where
    S: Store + 'static,
    I: InterpreterAdapter + 'static,
{
    async fn complete_call(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        outcome: CallOutcome,
    ) {
        if let Some(orchestrator) = self.0.upgrade() {
            CompletionSink::complete_call(&*orchestrator, execution_id, resume_group_id, call_id, outcome).await;
        }
    }
}

/// Applies a batch of call outcomes to the interpreter without going
/// through the `Store` — used only by [`crate::interpreter::reference`]'s
/// tests and the in-crate integration tests to build `HashMap<i32,
/// CallOutcome>` fixtures. Not part of the orchestrator's own API.
#[allow(dead_code)]
pub(crate) fn results_map(pairs: Vec<(i32, CallOutcome)>) -> HashMap<i32, CallOutcome> {
    pairs.into_iter().collect()
}
