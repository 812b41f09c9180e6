// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The embedding API (spec §6) exposed over HTTP, for callers that cannot
//! link `aegis-workflow-core` directly. Mirrors the teacher's
//! `Router::new().route(...).with_state(state)` construction.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use aegis_workflow_core::domain::CallOutcome;
use aegis_workflow_core::orchestrator::OrchestratorError;
use aegis_workflow_core::ExecutionId;

use crate::commands::AppOrchestrator;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<AppOrchestrator>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/executions", post(start_execution))
        .route("/executions/{id}", get(poll_execution))
        .route("/executions/{id}/pending-calls", get(get_pending_calls))
        .route("/executions/{id}/calls/{call_id}", post(complete_call))
        .route("/executions/{id}/result", get(get_result))
        .with_state(state)
}

#[derive(Deserialize)]
struct StartRequest {
    code: String,
    #[serde(default)]
    allowed_functions: Vec<String>,
    #[serde(default)]
    inputs: Option<serde_json::Value>,
}

async fn start_execution(State(state): State<ApiState>, Json(req): Json<StartRequest>) -> impl IntoResponse {
    match state
        .orchestrator
        .start_execution(req.code, req.allowed_functions, req.inputs)
        .await
    {
        Ok(id) => (StatusCode::CREATED, Json(serde_json::json!({ "execution_id": id }))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn poll_execution(State(state): State<ApiState>, Path(id): Path<ExecutionId>) -> impl IntoResponse {
    match state.orchestrator.poll_one(id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_pending_calls(State(state): State<ApiState>, Path(id): Path<ExecutionId>) -> impl IntoResponse {
    match state.orchestrator.get_pending_calls(id).await {
        Ok(calls) => Json(calls).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum CompleteCallRequest {
    Result { result: serde_json::Value },
    Error { error: String },
}

async fn complete_call(
    State(state): State<ApiState>,
    Path((id, call_id)): Path<(ExecutionId, i32)>,
    Json(req): Json<CompleteCallRequest>,
) -> impl IntoResponse {
    let outcome = match req {
        CompleteCallRequest::Result { result } => CallOutcome::Completed(result),
        CompleteCallRequest::Error { error } => CallOutcome::Failed(error),
    };
    match state.orchestrator.complete_call(id, call_id, outcome).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_result(State(state): State<ApiState>, Path(id): Path<ExecutionId>) -> impl IntoResponse {
    match state.orchestrator.get_result(id).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(err: OrchestratorError) -> axum::response::Response {
    let status = match &err {
        OrchestratorError::NotTerminal(_) | OrchestratorError::NoCurrentBatch(_) => StatusCode::CONFLICT,
        OrchestratorError::Store(_) | OrchestratorError::Interpreter(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
