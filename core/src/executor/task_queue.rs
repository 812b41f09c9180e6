// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{outcome_from_poll, Executor, ExecutorError, ExecutorStats, PollStatus};
use crate::domain::Call;

/// Abstract transport a [`TaskQueueExecutor`] serializes jobs onto. Kept
/// separate from `Executor` itself because the queue's wire format and
/// broker are external concerns — only the shape `{job_id, function_name,
/// args}` in, `{job_id, status, result|error}` out is specified here.
#[async_trait]
pub trait TaskQueueClient: Send + Sync {
    async fn enqueue(&self, job_id: &str, function_name: &str, args: &serde_json::Value) -> Result<(), String>;
    async fn poll(&self, job_id: &str) -> Option<PollStatus>;
}

/// Serializes calls onto an injected [`TaskQueueClient`]; relies on the
/// worker loop's polling step to learn when a job finishes.
pub struct TaskQueueExecutor {
    client: Arc<dyn TaskQueueClient>,
    stats: ExecutorStats,
}

impl TaskQueueExecutor {
    pub fn new(client: Arc<dyn TaskQueueClient>) -> Self {
        Self {
            client,
            stats: ExecutorStats::default(),
        }
    }
}

#[async_trait]
impl Executor for TaskQueueExecutor {
    async fn submit(&self, call: &Call) -> Result<String, ExecutorError> {
        let job_id = Uuid::new_v4().to_string();
        self.client
            .enqueue(&job_id, &call.function_name, &call.args)
            .await
            .map_err(ExecutorError::Submission)?;
        self.stats.submitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(job_id)
    }

    async fn poll(&self, job_handle: &str) -> Option<Result<PollStatus, ExecutorError>> {
        let status = self.client.poll(job_handle).await?;
        match &status {
            PollStatus::Completed(_) => {
                self.stats.completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            PollStatus::Failed(_) => {
                self.stats.failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            PollStatus::Pending => {}
        }
        Some(Ok(status))
    }

    fn stats(&self) -> &ExecutorStats {
        &self.stats
    }
}

struct QueuedJob {
    job_id: String,
    function_name: String,
    args: serde_json::Value,
}

/// An in-process, channel-backed [`TaskQueueClient`] test double. A
/// [`FunctionRegistry`](super::FunctionRegistry)-driven worker can drain it
/// with [`InProcessQueue::run_one`] to simulate a real out-of-process
/// consumer without a broker dependency.
#[derive(Default)]
pub struct InProcessQueue {
    pending: Mutex<VecDeque<QueuedJob>>,
    results: Mutex<std::collections::HashMap<String, PollStatus>>,
}

impl InProcessQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop one queued job and resolve it against `registry`, storing the
    /// outcome for a later `poll`.
    pub async fn run_one(&self, registry: &super::FunctionRegistry) -> bool {
        let job = {
            let mut pending = self.pending.lock();
            pending.pop_front()
        };
        let Some(job) = job else { return false };
        let status = match registry.invoke(&job.function_name, job.args).await {
            Ok(value) => PollStatus::Completed(value),
            Err(e) => PollStatus::Failed(e),
        };
        self.results.lock().insert(job.job_id, status);
        true
    }
}

#[async_trait]
impl TaskQueueClient for InProcessQueue {
    async fn enqueue(&self, job_id: &str, function_name: &str, args: &serde_json::Value) -> Result<(), String> {
        self.pending.lock().push_back(QueuedJob {
            job_id: job_id.to_string(),
            function_name: function_name.to_string(),
            args: args.clone(),
        });
        Ok(())
    }

    async fn poll(&self, job_id: &str) -> Option<PollStatus> {
        self.results.lock().remove(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CallOutcome, ExecutionId, ResumeGroupId};

    fn outcome_matches(status: PollStatus) -> Option<CallOutcome> {
        outcome_from_poll(status)
    }

    #[tokio::test]
    async fn poll_returns_pending_until_queue_runs_the_job() {
        let queue = Arc::new(InProcessQueue::new());
        let executor = TaskQueueExecutor::new(queue.clone());
        let call = Call::new_pending(
            ExecutionId::new(),
            ResumeGroupId::new(),
            crate::domain::PendingCallRequest {
                call_id: 0,
                function_name: "double".into(),
                args: serde_json::json!(21),
            },
        );
        let job_id = executor.submit(&call).await.unwrap();
        assert!(executor.poll(&job_id).await.is_none());

        let registry = crate::executor::FunctionRegistry::new().register(
            "double",
            |args: serde_json::Value| async move { Ok(serde_json::json!(args.as_i64().unwrap() * 2)) },
        );
        assert!(queue.run_one(&registry).await);

        let result = executor.poll(&job_id).await.unwrap().unwrap();
        let outcome = outcome_matches(result).unwrap();
        assert!(matches!(outcome, CallOutcome::Completed(v) if v == serde_json::json!(42)));
    }
}
