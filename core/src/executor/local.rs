// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{CompletionSink, Executor, ExecutorError, ExecutorStats, FunctionRegistry};
use crate::domain::{Call, CallOutcome};

/// Runs the registered function in the current Tokio task and reports the
/// outcome straight back to the orchestrator — no job ever outlives the
/// `submit` call, so `poll` is never needed.
pub struct LocalExecutor {
    registry: FunctionRegistry,
    sink: Arc<dyn CompletionSink>,
    stats: ExecutorStats,
}

impl LocalExecutor {
    pub fn new(registry: FunctionRegistry, sink: Arc<dyn CompletionSink>) -> Self {
        Self {
            registry,
            sink,
            stats: ExecutorStats::default(),
        }
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn submit(&self, call: &Call) -> Result<String, ExecutorError> {
        if !self.registry.contains(&call.function_name) {
            return Err(ExecutorError::UnknownFunction(call.function_name.clone()));
        }
        self.stats.submitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let job_handle = Uuid::new_v4().to_string();
        let outcome = match self.registry.invoke(&call.function_name, call.args.clone()).await {
            Ok(value) => {
                self.stats.completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                CallOutcome::Completed(value)
            }
            Err(error) => {
                self.stats.failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                CallOutcome::Failed(error)
            }
        };
        self.sink
            .complete_call(call.execution_id, call.resume_group_id, call.call_id, outcome)
            .await;
        Ok(job_handle)
    }

    fn stats(&self) -> &ExecutorStats {
        &self.stats
    }
}
