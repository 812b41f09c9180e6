// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `POST /webhook/complete` contract test (spec §6): 200 on success or
//! idempotent duplicate, 409 on a conflicting outcome, 404 on an unknown
//! `job_id`.

use std::sync::Arc;

use aegis_workflow_core::domain::ExecutionStatus;
use aegis_workflow_core::store::{InMemoryStore, Store};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use aegis_workflow_cli::backend::AnyStore;
use aegis_workflow_cli::webhook::{self, WebhookState};

async fn seed_pending_call(store: &AnyStore) -> (aegis_workflow_core::ExecutionId, String) {
    let execution = store
        .create_execution("await f()".into(), vec!["f".into()], None)
        .await
        .unwrap();
    let claimed = store.claim_scheduled().await.unwrap().unwrap();
    assert_eq!(claimed.status, ExecutionStatus::Running);

    let resume_group_id = aegis_workflow_core::ResumeGroupId::new();
    store
        .save_suspension(
            execution.id,
            ExecutionStatus::Running,
            vec![],
            resume_group_id,
            vec![aegis_workflow_core::domain::PendingCallRequest {
                call_id: 0,
                function_name: "f".into(),
                args: serde_json::Value::Null,
            }],
        )
        .await
        .unwrap();

    let job_handle = "job-1".to_string();
    store
        .set_job_handle(execution.id, resume_group_id, 0, job_handle.clone())
        .await
        .unwrap();
    (execution.id, job_handle)
}

fn app(store: Arc<AnyStore>) -> axum::Router {
    webhook::router(WebhookState { store })
}

#[tokio::test]
async fn unknown_job_id_returns_404() {
    let store = Arc::new(AnyStore::InMemory(InMemoryStore::new()));
    let response = app(store)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/complete")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&serde_json::json!({
                        "job_id": "does-not-exist",
                        "status": "finished",
                        "result": 1,
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn first_completion_succeeds_and_records_the_result() {
    let store = Arc::new(AnyStore::InMemory(InMemoryStore::new()));
    let (_, job_handle) = seed_pending_call(&store).await;

    let response = app(store.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/complete")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&serde_json::json!({
                        "job_id": job_handle,
                        "status": "finished",
                        "result": 42,
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, resume_group_id, _) = store.find_call_by_job_handle(&job_handle).await.unwrap().unwrap();
    let calls = store.get_calls(resume_group_id).await.unwrap();
    assert_eq!(calls[0].result, Some(serde_json::json!(42)));
}

#[tokio::test]
async fn duplicate_identical_completion_is_idempotent() {
    let store = Arc::new(AnyStore::InMemory(InMemoryStore::new()));
    let (_, job_handle) = seed_pending_call(&store).await;

    let payload = serde_json::json!({
        "job_id": job_handle,
        "status": "finished",
        "result": 42,
    });

    for _ in 0..2 {
        let response = app(store.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/complete")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&payload).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn conflicting_completion_returns_409() {
    let store = Arc::new(AnyStore::InMemory(InMemoryStore::new()));
    let (_, job_handle) = seed_pending_call(&store).await;

    let first = app(store.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/complete")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&serde_json::json!({
                        "job_id": job_handle,
                        "status": "finished",
                        "result": 42,
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app(store.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/complete")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_vec(&serde_json::json!({
                        "job_id": job_handle,
                        "status": "finished",
                        "result": 43,
                    }))
                    .unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}
