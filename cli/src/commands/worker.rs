// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `worker` — runs the steady-state loop of spec §4.5 in the foreground
//! until interrupted.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use aegis_workflow_core::config::OrchestratorConfig;
use aegis_workflow_core::WorkerLoop;

use crate::backend::AnyStore;

use super::orchestrator_for_worker;

#[derive(Args)]
pub struct WorkerArgs {
    /// Number of worker loops to run concurrently against the same store
    /// (spec §5: "zero or more worker instances ... sharing only the
    /// Store").
    #[arg(long, default_value_t = 1)]
    pub count: usize,
}

pub async fn run(config: &OrchestratorConfig, args: WorkerArgs) -> Result<()> {
    let store = Arc::new(AnyStore::from_config(config).await?);
    let orchestrator = orchestrator_for_worker(store.clone(), config);
    let executor = orchestrator.executor();
    let shutdown = CancellationToken::new();

    let mut handles = Vec::with_capacity(args.count);
    for index in 0..args.count {
        let worker = Arc::new(WorkerLoop::new(
            orchestrator.clone(),
            executor.clone(),
            store.clone(),
            config.worker_poll_interval(),
        ));
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            info!(worker = index, "worker loop starting");
            worker.run_forever(shutdown).await;
        }));
    }

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping worker loop(s)");
    shutdown.cancel();
    for handle in handles {
        handle.await.ok();
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
