// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use std::time::Duration;

use aegis_workflow_core::domain::ExecutionStatus;
use aegis_workflow_core::executor::FunctionRegistry;
use aegis_workflow_core::interpreter::reference::ReferenceInterpreter;
use aegis_workflow_core::store::{InMemoryStore, Store};
use aegis_workflow_core::{Orchestrator, WorkerLoop};

fn process_registry() -> FunctionRegistry {
    FunctionRegistry::new().register("process", |args: serde_json::Value| async move {
        let x = args[0].as_str().ok_or("expected a string argument")?.to_string();
        Ok(serde_json::json!(format!("p_{x}")))
    })
}

fn nested_gather_registry() -> FunctionRegistry {
    FunctionRegistry::new()
        .register("f", |args: serde_json::Value| async move {
            Ok(serde_json::json!(args[0].as_i64().unwrap() + 1))
        })
        .register("g", |args: serde_json::Value| async move {
            Ok(serde_json::json!(args[0].as_i64().unwrap() * 2))
        })
}

fn boom_registry() -> FunctionRegistry {
    FunctionRegistry::new().register("boom", |_args: serde_json::Value| async move {
        Err("boom always fails".to_string())
    })
}

fn new_harness(
    registry: FunctionRegistry,
) -> (
    Arc<Orchestrator<InMemoryStore, ReferenceInterpreter>>,
    Arc<WorkerLoop<InMemoryStore, ReferenceInterpreter>>,
) {
    let store = Arc::new(InMemoryStore::new());
    let interpreter = Arc::new(ReferenceInterpreter);
    let orchestrator = Orchestrator::new_with_local_executor(store.clone(), interpreter, registry);
    let executor = orchestrator_executor(&orchestrator);
    let worker = Arc::new(WorkerLoop::new(
        orchestrator.clone(),
        executor,
        store,
        Duration::from_millis(10),
    ));
    (orchestrator, worker)
}

// `Orchestrator` doesn't expose its executor handle directly (it's only
// needed internally for dispatch); tests that need the worker's polling
// step construct their own `LocalExecutor`-free harness instead. For the
// scenarios below, `run_until_idle` never needs to poll (the `LocalExecutor`
// resolves synchronously inside `advance`/`resume`), so a no-op executor is
// enough to satisfy `WorkerLoop`'s constructor.
fn orchestrator_executor(
    _orchestrator: &Arc<Orchestrator<InMemoryStore, ReferenceInterpreter>>,
) -> Arc<dyn aegis_workflow_core::executor::Executor> {
    struct NoPollExecutor(aegis_workflow_core::executor::ExecutorStats);
    #[async_trait::async_trait]
    impl aegis_workflow_core::executor::Executor for NoPollExecutor {
        async fn submit(
            &self,
            _call: &aegis_workflow_core::Call,
        ) -> Result<String, aegis_workflow_core::executor::ExecutorError> {
            unreachable!("the harness's Orchestrator dispatches through its own LocalExecutor")
        }
        fn stats(&self) -> &aegis_workflow_core::executor::ExecutorStats {
            &self.0
        }
    }
    Arc::new(NoPollExecutor(Default::default()))
}

#[tokio::test]
async fn scenario_1_immediate_completion() {
    let (orchestrator, worker) = new_harness(FunctionRegistry::new());
    let execution_id = orchestrator
        .start_execution("1 + 2".into(), vec![], None)
        .await
        .unwrap();
    worker.run_until_idle().await.unwrap();

    let poll = orchestrator.poll_one(execution_id).await.unwrap();
    assert_eq!(poll.status, ExecutionStatus::Completed);
    assert_eq!(poll.output, Some(serde_json::json!(3)));
    assert!(poll.pending_calls.is_empty());
}

#[tokio::test]
async fn scenario_2_single_batch_of_three_parallel_calls() {
    let (orchestrator, worker) = new_harness(process_registry());
    let execution_id = orchestrator
        .start_execution(
            "gather(process('a'), process('b'), process('c'))".into(),
            vec!["process".into()],
            None,
        )
        .await
        .unwrap();
    worker.run_until_idle().await.unwrap();

    let result = orchestrator.get_result(execution_id).await.unwrap();
    assert_eq!(result, serde_json::json!(["p_a", "p_b", "p_c"]));
}

#[tokio::test]
async fn scenario_3_nested_gather_runs_two_batches_in_sequence() {
    let (orchestrator, worker) = new_harness(nested_gather_registry());
    let code = "xs = gather(f(1), f(2), f(3)); ys = gather(g(xs[0]), g(xs[1]), g(xs[2])); ys";
    let execution_id = orchestrator
        .start_execution(code.into(), vec!["f".into(), "g".into()], None)
        .await
        .unwrap();
    worker.run_until_idle().await.unwrap();

    let result = orchestrator.get_result(execution_id).await.unwrap();
    assert_eq!(result, serde_json::json!([4, 6, 8]));
}

#[tokio::test]
async fn scenario_4_call_failure_caught_by_workflow() {
    let (orchestrator, worker) = new_harness(boom_registry());
    let code = r#"try: await boom(); return "ok" except: return "caught""#;
    let execution_id = orchestrator
        .start_execution(code.into(), vec!["boom".into()], None)
        .await
        .unwrap();
    worker.run_until_idle().await.unwrap();

    let poll = orchestrator.poll_one(execution_id).await.unwrap();
    assert_eq!(poll.status, ExecutionStatus::Completed);
    assert_eq!(poll.output, Some(serde_json::json!("caught")));
}

#[tokio::test]
async fn scenario_5_unhandled_call_failure_fails_the_execution() {
    let (orchestrator, worker) = new_harness(boom_registry());
    let execution_id = orchestrator
        .start_execution("await boom()".into(), vec!["boom".into()], None)
        .await
        .unwrap();
    worker.run_until_idle().await.unwrap();

    let poll = orchestrator.poll_one(execution_id).await.unwrap();
    assert_eq!(poll.status, ExecutionStatus::Failed);
    assert!(poll.error.is_some());
    assert!(poll.output.is_none());
}

struct ManualExecutor(aegis_workflow_core::executor::ExecutorStats);

#[async_trait::async_trait]
impl aegis_workflow_core::executor::Executor for ManualExecutor {
    async fn submit(
        &self,
        _call: &aegis_workflow_core::Call,
    ) -> Result<String, aegis_workflow_core::executor::ExecutorError> {
        // Accepts the job but never resolves it on its own — completions
        // are delivered later, by hand, as if by a remote executor.
        Ok(uuid::Uuid::new_v4().to_string())
    }
    fn stats(&self) -> &aegis_workflow_core::executor::ExecutorStats {
        &self.0
    }
}

#[tokio::test]
async fn scenario_6_crash_restart_durability() {
    let store = Arc::new(InMemoryStore::new());

    // The original worker: writes the suspended batch, then "crashes"
    // (is simply dropped) before any call completes.
    let orchestrator1 = Orchestrator::new(
        store.clone(),
        Arc::new(ReferenceInterpreter),
        Arc::new(ManualExecutor(Default::default())),
    );
    let execution_id = orchestrator1
        .start_execution(
            "gather(process('a'), process('b'), process('c'))".into(),
            vec!["process".into()],
            None,
        )
        .await
        .unwrap();
    let claimed = store.claim_scheduled().await.unwrap().unwrap();
    orchestrator1.advance(claimed.id).await.unwrap();

    let mid_crash = orchestrator1.poll_one(execution_id).await.unwrap();
    assert_eq!(mid_crash.status, ExecutionStatus::Waiting);
    assert_eq!(mid_crash.pending_calls.len(), 3);
    drop(orchestrator1);

    // A fresh worker, built from nothing but the store, observes the same
    // waiting execution and receives the completions scenario 2 would have.
    let orchestrator2 = Arc::new(Orchestrator::new(
        store.clone(),
        Arc::new(ReferenceInterpreter),
        Arc::new(ManualExecutor(Default::default())),
    ));
    let resumed = orchestrator2.poll_one(execution_id).await.unwrap();
    assert_eq!(resumed.status, ExecutionStatus::Waiting);
    assert_eq!(resumed.pending_calls.len(), 3);

    for (call_id, value) in [(0, "p_a"), (1, "p_b"), (2, "p_c")] {
        orchestrator2
            .complete_call(execution_id, call_id, aegis_workflow_core::CallOutcome::Completed(serde_json::json!(value)))
            .await
            .unwrap();
    }

    let worker2 = WorkerLoop::new(
        orchestrator2.clone(),
        Arc::new(ManualExecutor(Default::default())),
        store,
        Duration::from_millis(10),
    );
    worker2.run_until_idle().await.unwrap();

    let result = orchestrator2.get_result(execution_id).await.unwrap();
    assert_eq!(result, serde_json::json!(["p_a", "p_b", "p_c"]));
}
