// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `POST /webhook/complete` — converts externally-pushed completions (the
//! [`aegis_workflow_core::executor::PushExecutor`] side of spec §4.3) into
//! `complete_call` invocations, per spec §6.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use aegis_workflow_core::domain::CallOutcome;
use aegis_workflow_core::store::{Store, StoreError};

use crate::backend::AnyStore;

#[derive(Clone)]
pub struct WebhookState {
    pub store: Arc<AnyStore>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/webhook/complete", post(complete)).with_state(state)
}

#[derive(Deserialize)]
struct WebhookPayload {
    job_id: String,
    status: WebhookStatus,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

#[derive(Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum WebhookStatus {
    Finished,
    Failed,
}

async fn complete(State(state): State<WebhookState>, Json(payload): Json<WebhookPayload>) -> impl IntoResponse {
    let resolved = match state.store.find_call_by_job_handle(&payload.job_id).await {
        Ok(Some(ids)) => ids,
        Ok(None) => return StatusCode::NOT_FOUND,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR,
    };
    let (execution_id, resume_group_id, call_id) = resolved;

    let outcome = match payload.status {
        WebhookStatus::Finished => CallOutcome::Completed(payload.result.unwrap_or(serde_json::Value::Null)),
        WebhookStatus::Failed => CallOutcome::Failed(payload.error.unwrap_or_else(|| "job failed".to_string())),
    };

    match state.store.complete_call(execution_id, resume_group_id, call_id, outcome).await {
        Ok(()) => StatusCode::OK,
        Err(StoreError::OutcomeConflict { .. }) => StatusCode::CONFLICT,
        Err(StoreError::CallNotFound { .. }) => StatusCode::NOT_FOUND,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
