// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::{Executor, ExecutorError, ExecutorStats};
use crate::domain::Call;

#[derive(Serialize)]
struct PushJobRequest<'a> {
    job_id: &'a str,
    function_name: &'a str,
    args: &'a serde_json::Value,
    callback_url: &'a str,
}

/// Dispatches calls to a remote compute endpoint over HTTP and declares
/// itself push-only: the remote side delivers the outcome later via
/// `POST /webhook/complete` (spec §6), not through `poll`.
pub struct PushExecutor {
    client: reqwest::Client,
    submit_url: String,
    callback_url: String,
    stats: ExecutorStats,
}

impl PushExecutor {
    pub fn new(submit_url: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            submit_url: submit_url.into(),
            callback_url: callback_url.into(),
            stats: ExecutorStats::default(),
        }
    }
}

#[async_trait]
impl Executor for PushExecutor {
    async fn submit(&self, call: &Call) -> Result<String, ExecutorError> {
        let job_id = Uuid::new_v4().to_string();
        let body = PushJobRequest {
            job_id: &job_id,
            function_name: &call.function_name,
            args: &call.args,
            callback_url: &self.callback_url,
        };
        let response = self
            .client
            .post(&self.submit_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutorError::Submission(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Submission(format!(
                "remote executor rejected job: HTTP {}",
                response.status()
            )));
        }
        self.stats.submitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(job_id)
    }

    // No `poll` override: this executor is push-only, per the trait's default.

    fn stats(&self) -> &ExecutorStats {
        &self.stats
    }
}
