// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One module per CLI subcommand, mirroring the embedding API and worker
//! surface of `aegis-workflow-core`.

pub mod execution;
pub mod migrate;
pub mod serve;
pub mod worker;

use std::sync::Arc;

use aegis_workflow_core::config::{ExecutorKind, OrchestratorConfig};
use aegis_workflow_core::executor::{Executor, FunctionRegistry, PushExecutor};
use aegis_workflow_core::interpreter::reference::ReferenceInterpreter;
use aegis_workflow_core::Orchestrator;

use crate::backend::AnyStore;

/// The one interpreter this binary links. A real deployment would depend on
/// its own sandboxed-language crate here instead; absent one, the reference
/// evaluator (normally test-only) is the bundled default — see `DESIGN.md`.
pub type AppOrchestrator = Orchestrator<AnyStore, ReferenceInterpreter>;

/// Construct the orchestrator used by `start`/`poll`/`complete-call`/
/// `result`: these never dispatch a call themselves (only `advance`/
/// `resume` do), so an empty local registry is sufficient no matter which
/// executor `worker`/`serve` are configured to use.
pub fn orchestrator_for_commands(store: Arc<AnyStore>) -> Arc<AppOrchestrator> {
    Orchestrator::new_with_local_executor(store, Arc::new(ReferenceInterpreter), FunctionRegistry::new())
}

/// Construct the orchestrator + dispatch executor `worker`/`serve` actually
/// run calls through, per `config.executor` (spec §4.3).
pub fn orchestrator_for_worker(store: Arc<AnyStore>, config: &OrchestratorConfig) -> Arc<AppOrchestrator> {
    match &config.executor {
        ExecutorKind::Local => {
            // No compiled-in business logic: the registry an embedding
            // application would populate is left empty here, so `local`
            // mode is only useful once a real application wires its own
            // functions in via `aegis_workflow_core` directly.
            Orchestrator::new_with_local_executor(store, Arc::new(ReferenceInterpreter), FunctionRegistry::new())
        }
        ExecutorKind::TaskQueue => {
            tracing::warn!(
                "executor: task_queue has no broker configured in this binary; calls will never be dispatched"
            );
            let executor: Arc<dyn Executor> = Arc::new(aegis_workflow_core::executor::TaskQueueExecutor::new(
                Arc::new(aegis_workflow_core::executor::InProcessQueue::new()),
            ));
            Arc::new(Orchestrator::new(store, Arc::new(ReferenceInterpreter), executor))
        }
        ExecutorKind::Push { submit_url, callback_url } => {
            let executor: Arc<dyn Executor> = Arc::new(PushExecutor::new(submit_url.clone(), callback_url.clone()));
            Arc::new(Orchestrator::new(store, Arc::new(ReferenceInterpreter), executor))
        }
    }
}
