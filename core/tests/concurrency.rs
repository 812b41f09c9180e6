// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aegis_workflow_core::domain::{CallOutcome, ExecutionStatus};
use aegis_workflow_core::executor::{Executor, ExecutorError, ExecutorStats, FunctionRegistry};
use aegis_workflow_core::interpreter::reference::ReferenceInterpreter;
use aegis_workflow_core::store::{InMemoryStore, Store};
use aegis_workflow_core::{Call, Orchestrator};

struct ManualExecutor(ExecutorStats);

#[async_trait::async_trait]
impl Executor for ManualExecutor {
    async fn submit(&self, _call: &Call) -> Result<String, ExecutorError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }
    fn stats(&self) -> &ExecutorStats {
        &self.0
    }
}

/// Fire N concurrent `complete_call` requests for the last pending call in
/// a batch; exactly one subsequent `resume` should execute (spec §8 race
/// tests, P3).
#[tokio::test]
async fn concurrent_complete_call_for_the_same_call_resolves_exactly_once() {
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        Arc::new(ReferenceInterpreter),
        Arc::new(ManualExecutor(Default::default())),
    ));

    let execution_id = orchestrator
        .start_execution("await boom()".into(), vec!["boom".into()], None)
        .await
        .unwrap();
    let claimed = store.claim_scheduled().await.unwrap().unwrap();
    orchestrator.advance(claimed.id).await.unwrap();

    let successes = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let orchestrator = orchestrator.clone();
        let successes = successes.clone();
        handles.push(tokio::spawn(async move {
            let outcome = CallOutcome::Completed(serde_json::json!("ok"));
            if orchestrator.complete_call(execution_id, 0, outcome).await.is_ok() {
                successes.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    // Every caller reported the identical outcome, so idempotent completion
    // means every call to `complete_call` returns Ok — the invariant under
    // test is that the underlying resume_group's call only ever lands in
    // one terminal state, not that only one caller "wins".
    assert_eq!(successes.load(Ordering::Relaxed), 16);

    // Now race `resume` itself: only one concurrent caller may transition
    // waiting -> resuming.
    let mut resume_handles = Vec::new();
    let resume_wins = Arc::new(AtomicUsize::new(0));
    for _ in 0..16 {
        let orchestrator = orchestrator.clone();
        let store = store.clone();
        let resume_wins = resume_wins.clone();
        resume_handles.push(tokio::spawn(async move {
            let execution = store.get_execution(execution_id).await.unwrap();
            if let Some(resume_group_id) = execution.resume_group_id {
                if store.claim_resume(execution_id, resume_group_id).await.unwrap() {
                    resume_wins.fetch_add(1, Ordering::Relaxed);
                }
            }
            orchestrator.resume(execution_id).await.ok();
        }));
    }
    for h in resume_handles {
        h.await.unwrap();
    }
    assert_eq!(resume_wins.load(Ordering::Relaxed), 1);

    let poll = orchestrator.poll_one(execution_id).await.unwrap();
    assert_eq!(poll.status, ExecutionStatus::Completed);
}

/// Fire N concurrent `claim_scheduled` against a single scheduled
/// execution; exactly one wins, and exactly one `advance` runs.
#[tokio::test]
async fn concurrent_claim_scheduled_has_exactly_one_winner() {
    let store = Arc::new(InMemoryStore::new());
    store.create_execution("1 + 1".into(), vec![], None).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..32 {
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

/// Nested gather race: ensure only one worker advances the second batch
/// (regression guard for the resume_group_id guard being re-checked on
/// every `save_suspension`, not just the first one).
#[tokio::test]
async fn nested_batches_never_interleave_across_concurrent_workers() {
    let store = Arc::new(InMemoryStore::new());
    let registry = FunctionRegistry::new()
        .register("f", |args: serde_json::Value| async move {
            Ok(serde_json::json!(args[0].as_i64().unwrap() + 1))
        })
        .register("g", |args: serde_json::Value| async move {
            Ok(serde_json::json!(args[0].as_i64().unwrap() * 2))
        });
    let orchestrator =
        Orchestrator::new_with_local_executor(store.clone(), Arc::new(ReferenceInterpreter), registry);

    let code = "xs = gather(f(1), f(2), f(3)); ys = gather(g(xs[0]), g(xs[1]), g(xs[2])); ys";
    let execution_id = orchestrator
        .start_execution(code.into(), vec!["f".into(), "g".into()], None)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orchestrator = orchestrator.clone();
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            if let Some(execution) = store.claim_scheduled().await.unwrap() {
                orchestrator.advance(execution.id).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let result = orchestrator.get_result(execution_id).await.unwrap();
    assert_eq!(result, serde_json::json!([4, 6, 8]));
}
