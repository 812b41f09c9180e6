// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `start` / `poll` / `complete-call` / `result` — the embedding API (spec
//! §6) exposed as one-shot CLI invocations, each opening its own handle to
//! the configured `Store` and exiting once the operation completes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use aegis_workflow_core::config::OrchestratorConfig;
use aegis_workflow_core::domain::CallOutcome;
use aegis_workflow_core::ExecutionId;

use crate::backend::AnyStore;

use super::orchestrator_for_commands;

#[derive(Args)]
pub struct StartArgs {
    /// Path to a file containing the workflow's source code.
    #[arg(value_name = "CODE_FILE")]
    pub code_file: PathBuf,

    /// Function names the workflow is allowed to call (repeatable).
    #[arg(long = "allow", value_name = "NAME")]
    pub allowed_functions: Vec<String>,

    /// Structured input value, as a JSON string.
    #[arg(long, value_name = "JSON")]
    pub inputs: Option<String>,
}

#[derive(Args)]
pub struct PollArgs {
    /// Execution to poll; omit to list every non-terminal execution.
    #[arg(value_name = "EXECUTION_ID")]
    pub execution_id: Option<ExecutionId>,
}

#[derive(Args)]
pub struct CompleteCallArgs {
    #[arg(value_name = "EXECUTION_ID")]
    pub execution_id: ExecutionId,

    #[arg(value_name = "CALL_ID")]
    pub call_id: i32,

    /// Report success with this JSON value.
    #[arg(long, value_name = "JSON", conflicts_with = "error")]
    pub result: Option<String>,

    /// Report failure with this message.
    #[arg(long, value_name = "MESSAGE", conflicts_with = "result")]
    pub error: Option<String>,
}

#[derive(Args)]
pub struct ResultArgs {
    #[arg(value_name = "EXECUTION_ID")]
    pub execution_id: ExecutionId,
}

pub async fn start(config: &OrchestratorConfig, args: StartArgs) -> Result<()> {
    let code = std::fs::read_to_string(&args.code_file)
        .with_context(|| format!("failed to read {}", args.code_file.display()))?;
    let inputs = args
        .inputs
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .context("--inputs must be valid JSON")?;

    let store = Arc::new(AnyStore::from_config(config).await?);
    let orchestrator = orchestrator_for_commands(store);
    let execution_id = orchestrator
        .start_execution(code, args.allowed_functions, inputs)
        .await
        .context("failed to start execution")?;

    println!("{} {}", "execution scheduled:".green(), execution_id);
    Ok(())
}

pub async fn poll(config: &OrchestratorConfig, args: PollArgs) -> Result<()> {
    let store = Arc::new(AnyStore::from_config(config).await?);
    let orchestrator = orchestrator_for_commands(store);

    match args.execution_id {
        Some(id) => {
            let view = orchestrator.poll_one(id).await.context("failed to poll execution")?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        None => {
            let views = orchestrator.poll_all().await.context("failed to poll executions")?;
            println!("{}", serde_json::to_string_pretty(&views)?);
        }
    }
    Ok(())
}

pub async fn complete_call(config: &OrchestratorConfig, args: CompleteCallArgs) -> Result<()> {
    let outcome = match (args.result, args.error) {
        (Some(raw), None) => {
            CallOutcome::Completed(serde_json::from_str(&raw).context("--result must be valid JSON")?)
        }
        (None, Some(message)) => CallOutcome::Failed(message),
        _ => anyhow::bail!("exactly one of --result or --error is required"),
    };

    let store = Arc::new(AnyStore::from_config(config).await?);
    let orchestrator = orchestrator_for_commands(store);
    orchestrator
        .complete_call(args.execution_id, args.call_id, outcome)
        .await
        .context("failed to record call outcome")?;

    println!("{}", "call recorded".green());
    Ok(())
}

pub async fn result(config: &OrchestratorConfig, args: ResultArgs) -> Result<()> {
    let store = Arc::new(AnyStore::from_config(config).await?);
    let orchestrator = orchestrator_for_commands(store);
    let value = orchestrator
        .get_result(args.execution_id)
        .await
        .context("execution has no result yet")?;

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
