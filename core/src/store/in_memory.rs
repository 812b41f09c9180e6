// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BatchStatus, Store, StoreError};
use crate::domain::{
    Call, CallOutcome, CallRowId, CallStatus, Execution, ExecutionId, ExecutionStatus,
    PendingCallRequest, ResumeGroupId,
};

#[derive(Default)]
struct Inner {
    executions: HashMap<ExecutionId, Execution>,
    calls: HashMap<ResumeGroupId, Vec<Call>>,
    job_handles: HashMap<String, (ExecutionId, ResumeGroupId, i32)>,
    next_call_row_id: i64,
    creation_order: Vec<ExecutionId>,
}

/// A `parking_lot::Mutex`-guarded in-process `Store`, for tests and
/// single-process embedding. No lock is ever held across an `.await` —
/// every operation here is synchronous once the guard is taken.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_execution(
        &self,
        code: String,
        allowed_functions: Vec<String>,
        inputs: Option<serde_json::Value>,
    ) -> Result<Execution, StoreError> {
        let execution = Execution::new(code, inputs, allowed_functions);
        let mut inner = self.inner.lock();
        inner.creation_order.push(execution.id);
        inner.executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn claim_scheduled(&self) -> Result<Option<Execution>, StoreError> {
        let mut inner = self.inner.lock();
        let candidate = inner
            .creation_order
            .iter()
            .find(|id| {
                inner
                    .executions
                    .get(id)
                    .map(|e| e.status == ExecutionStatus::Scheduled)
                    .unwrap_or(false)
            })
            .copied();
        match candidate {
            Some(id) => {
                let exec = inner.executions.get_mut(&id).expect("candidate exists");
                exec.mark_running()
                    .map_err(|_| StoreError::Conflict(id))?;
                Ok(Some(exec.clone()))
            }
            None => Ok(None),
        }
    }

    async fn save_suspension(
        &self,
        execution_id: ExecutionId,
        expected_status: ExecutionStatus,
        state_bytes: Vec<u8>,
        resume_group_id: ResumeGroupId,
        calls: Vec<PendingCallRequest>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let exec = inner
            .executions
            .get_mut(&execution_id)
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;
        if exec.status != expected_status {
            return Err(StoreError::Conflict(execution_id));
        }
        exec.mark_waiting(state_bytes, resume_group_id)
            .map_err(|_| StoreError::Conflict(execution_id))?;

        let mut rows = Vec::with_capacity(calls.len());
        for request in calls {
            let mut call = Call::new_pending(execution_id, resume_group_id, request);
            inner.next_call_row_id += 1;
            call.id = CallRowId(inner.next_call_row_id);
            rows.push(call);
        }
        inner.calls.insert(resume_group_id, rows);
        Ok(())
    }

    async fn complete_call(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        outcome: CallOutcome,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let rows = inner
            .calls
            .get_mut(&resume_group_id)
            .ok_or(StoreError::CallNotFound {
                execution_id,
                resume_group_id,
                call_id,
            })?;
        let call = rows
            .iter_mut()
            .find(|c| c.call_id == call_id)
            .ok_or(StoreError::CallNotFound {
                execution_id,
                resume_group_id,
                call_id,
            })?;

        if call.status.is_terminal() {
            let matches = match (&call.result, &call.error, &outcome) {
                (Some(existing), _, CallOutcome::Completed(new)) => existing == new,
                (_, Some(existing), CallOutcome::Failed(new)) => existing == new,
                _ => false,
            };
            return if matches {
                Ok(())
            } else {
                Err(StoreError::OutcomeConflict {
                    execution_id,
                    resume_group_id,
                    call_id,
                })
            };
        }

        match outcome {
            CallOutcome::Completed(value) => {
                call.status = CallStatus::Completed;
                call.result = Some(value);
            }
            CallOutcome::Failed(error) => {
                call.status = CallStatus::Failed;
                call.error = Some(error);
            }
        }
        call.completed_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn batch_status(&self, resume_group_id: ResumeGroupId) -> Result<BatchStatus, StoreError> {
        let inner = self.inner.lock();
        let rows = inner.calls.get(&resume_group_id).cloned().unwrap_or_default();
        let mut status = BatchStatus {
            total: rows.len(),
            ..Default::default()
        };
        for call in &rows {
            match call.status {
                CallStatus::Completed => status.completed += 1,
                CallStatus::Failed => status.failed += 1,
                CallStatus::Pending | CallStatus::Running => status.pending_or_running += 1,
            }
        }
        Ok(status)
    }

    async fn claim_resume(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let all_terminal = inner
            .calls
            .get(&resume_group_id)
            .map(|rows| rows.iter().all(|c| c.status.is_terminal()))
            .unwrap_or(false);
        if !all_terminal {
            return Ok(false);
        }
        let exec = inner
            .executions
            .get_mut(&execution_id)
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;
        if exec.resume_group_id != Some(resume_group_id) || exec.status != ExecutionStatus::Waiting {
            return Ok(false);
        }
        match exec.mark_resuming() {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn load_for_resume(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
    ) -> Result<(Vec<u8>, HashMap<i32, CallOutcome>), StoreError> {
        let inner = self.inner.lock();
        let exec = inner
            .executions
            .get(&execution_id)
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;
        let state = exec
            .state
            .clone()
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;
        let rows = inner.calls.get(&resume_group_id).cloned().unwrap_or_default();
        let mut results = HashMap::new();
        for call in rows {
            let outcome = match (call.result, call.error) {
                (Some(v), _) => CallOutcome::Completed(v),
                (None, Some(e)) => CallOutcome::Failed(e),
                (None, None) => continue,
            };
            results.insert(call.call_id, outcome);
        }
        Ok((state, results))
    }

    async fn finish(
        &self,
        execution_id: ExecutionId,
        result: Result<serde_json::Value, String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let exec = inner
            .executions
            .get_mut(&execution_id)
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;
        match result {
            Ok(value) => exec
                .mark_completed(value)
                .map_err(|_| StoreError::Conflict(execution_id)),
            Err(error) => exec
                .mark_failed(error)
                .map_err(|_| StoreError::Conflict(execution_id)),
        }
    }

    async fn get_execution(&self, execution_id: ExecutionId) -> Result<Execution, StoreError> {
        let inner = self.inner.lock();
        inner
            .executions
            .get(&execution_id)
            .cloned()
            .ok_or(StoreError::ExecutionNotFound(execution_id))
    }

    async fn get_calls(&self, resume_group_id: ResumeGroupId) -> Result<Vec<Call>, StoreError> {
        let inner = self.inner.lock();
        let mut rows = inner.calls.get(&resume_group_id).cloned().unwrap_or_default();
        rows.sort_by_key(|c| c.call_id);
        Ok(rows)
    }

    async fn list_waiting(&self) -> Result<Vec<Execution>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .executions
            .values()
            .filter(|e| e.status == ExecutionStatus::Waiting)
            .cloned()
            .collect())
    }

    async fn find_call_by_job_handle(
        &self,
        job_handle: &str,
    ) -> Result<Option<(ExecutionId, ResumeGroupId, i32)>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.job_handles.get(job_handle).copied())
    }

    async fn set_job_handle(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        job_handle: String,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(rows) = inner.calls.get_mut(&resume_group_id) {
            if let Some(call) = rows.iter_mut().find(|c| c.call_id == call_id) {
                call.job_handle = Some(job_handle.clone());
            }
        }
        inner
            .job_handles
            .insert(job_handle, (execution_id, resume_group_id, call_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_scheduled_only_claims_one_among_concurrent_callers() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        store
            .create_execution("1 + 1".into(), vec![], None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.claim_scheduled().await.unwrap() }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
