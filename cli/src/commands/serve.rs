// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `serve` — runs the embedding API (spec §6) and, when the push executor
//! is selected, the webhook endpoint, plus the worker loop(s) needed to
//! actually drive executions forward. Grounded in the teacher's
//! `cli::daemon::server::start_daemon` background-task convention.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use aegis_workflow_core::config::{ExecutorKind, OrchestratorConfig};
use aegis_workflow_core::WorkerLoop;

use crate::api::{self, ApiState};
use crate::backend::AnyStore;
use crate::webhook::{self, WebhookState};

use super::orchestrator_for_worker;

#[derive(Args)]
pub struct ServeArgs {
    /// Number of worker loops to run alongside the HTTP server.
    #[arg(long, default_value_t = 1)]
    pub workers: usize,
}

pub async fn run(config: &OrchestratorConfig, args: ServeArgs) -> Result<()> {
    let store = Arc::new(AnyStore::from_config(config).await?);
    let orchestrator = orchestrator_for_worker(store.clone(), config);
    let executor = orchestrator.executor();

    let mut app = Router::new().merge(api::router(ApiState {
        orchestrator: orchestrator.clone(),
    }));
    if matches!(config.executor, ExecutorKind::Push { .. }) {
        app = app.merge(webhook::router(WebhookState { store: store.clone() }));
    }
    let app = app.layer(TraceLayer::new_for_http());

    let shutdown = CancellationToken::new();
    let mut worker_handles = Vec::with_capacity(args.workers);
    for index in 0..args.workers {
        let worker = Arc::new(WorkerLoop::new(
            orchestrator.clone(),
            executor.clone(),
            store.clone(),
            config.worker_poll_interval(),
        ));
        let shutdown = shutdown.clone();
        worker_handles.push(tokio::spawn(async move {
            info!(worker = index, "worker loop starting");
            worker.run_forever(shutdown).await;
        }));
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!(address = %config.bind_address, "serving embedding API");

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("HTTP server failed")?;

    shutdown.cancel();
    for handle in worker_handles {
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
