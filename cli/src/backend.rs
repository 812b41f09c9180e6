// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The CLI's choice of [`Store`] backend, selected at runtime from
//! [`OrchestratorConfig::database_url`]. An embedding application wired
//! directly against `aegis-workflow-core` would just pick one backend at
//! compile time; this binary picks either, so it wraps both behind a thin
//! dispatching enum rather than making every command generic twice over.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;

use aegis_workflow_core::config::OrchestratorConfig;
use aegis_workflow_core::domain::{Call, CallOutcome, Execution, ExecutionId, ExecutionStatus, PendingCallRequest, ResumeGroupId};
use aegis_workflow_core::store::{BatchStatus, InMemoryStore, PostgresStore, Store, StoreError};

pub enum AnyStore {
    InMemory(InMemoryStore),
    Postgres(PostgresStore),
}

impl AnyStore {
    pub async fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("failed to connect to the configured database_url")?;
                Ok(Self::Postgres(PostgresStore::new(pool)))
            }
            None => {
                tracing::warn!("no database_url configured; using the in-memory store (not durable across restarts)");
                Ok(Self::InMemory(InMemoryStore::new()))
            }
        }
    }
}

#[async_trait]
impl Store for AnyStore {
    async fn create_execution(
        &self,
        code: String,
        allowed_functions: Vec<String>,
        inputs: Option<serde_json::Value>,
    ) -> Result<Execution, StoreError> {
        match self {
            Self::InMemory(s) => s.create_execution(code, allowed_functions, inputs).await,
            Self::Postgres(s) => s.create_execution(code, allowed_functions, inputs).await,
        }
    }

    async fn claim_scheduled(&self) -> Result<Option<Execution>, StoreError> {
        match self {
            Self::InMemory(s) => s.claim_scheduled().await,
            Self::Postgres(s) => s.claim_scheduled().await,
        }
    }

    async fn save_suspension(
        &self,
        execution_id: ExecutionId,
        expected_status: ExecutionStatus,
        state_bytes: Vec<u8>,
        resume_group_id: ResumeGroupId,
        calls: Vec<PendingCallRequest>,
    ) -> Result<(), StoreError> {
        match self {
            Self::InMemory(s) => {
                s.save_suspension(execution_id, expected_status, state_bytes, resume_group_id, calls)
                    .await
            }
            Self::Postgres(s) => {
                s.save_suspension(execution_id, expected_status, state_bytes, resume_group_id, calls)
                    .await
            }
        }
    }

    async fn complete_call(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        outcome: CallOutcome,
    ) -> Result<(), StoreError> {
        match self {
            Self::InMemory(s) => s.complete_call(execution_id, resume_group_id, call_id, outcome).await,
            Self::Postgres(s) => s.complete_call(execution_id, resume_group_id, call_id, outcome).await,
        }
    }

    async fn batch_status(&self, resume_group_id: ResumeGroupId) -> Result<BatchStatus, StoreError> {
        match self {
            Self::InMemory(s) => s.batch_status(resume_group_id).await,
            Self::Postgres(s) => s.batch_status(resume_group_id).await,
        }
    }

    async fn claim_resume(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
    ) -> Result<bool, StoreError> {
        match self {
            Self::InMemory(s) => s.claim_resume(execution_id, resume_group_id).await,
            Self::Postgres(s) => s.claim_resume(execution_id, resume_group_id).await,
        }
    }

    async fn load_for_resume(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
    ) -> Result<(Vec<u8>, HashMap<i32, CallOutcome>), StoreError> {
        match self {
            Self::InMemory(s) => s.load_for_resume(execution_id, resume_group_id).await,
            Self::Postgres(s) => s.load_for_resume(execution_id, resume_group_id).await,
        }
    }

    async fn finish(
        &self,
        execution_id: ExecutionId,
        result: Result<serde_json::Value, String>,
    ) -> Result<(), StoreError> {
        match self {
            Self::InMemory(s) => s.finish(execution_id, result).await,
            Self::Postgres(s) => s.finish(execution_id, result).await,
        }
    }

    async fn get_execution(&self, execution_id: ExecutionId) -> Result<Execution, StoreError> {
        match self {
            Self::InMemory(s) => s.get_execution(execution_id).await,
            Self::Postgres(s) => s.get_execution(execution_id).await,
        }
    }

    async fn get_calls(&self, resume_group_id: ResumeGroupId) -> Result<Vec<Call>, StoreError> {
        match self {
            Self::InMemory(s) => s.get_calls(resume_group_id).await,
            Self::Postgres(s) => s.get_calls(resume_group_id).await,
        }
    }

    async fn list_waiting(&self) -> Result<Vec<Execution>, StoreError> {
        match self {
            Self::InMemory(s) => s.list_waiting().await,
            Self::Postgres(s) => s.list_waiting().await,
        }
    }

    async fn find_call_by_job_handle(
        &self,
        job_handle: &str,
    ) -> Result<Option<(ExecutionId, ResumeGroupId, i32)>, StoreError> {
        match self {
            Self::InMemory(s) => s.find_call_by_job_handle(job_handle).await,
            Self::Postgres(s) => s.find_call_by_job_handle(job_handle).await,
        }
    }

    async fn set_job_handle(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        job_handle: String,
    ) -> Result<(), StoreError> {
        match self {
            Self::InMemory(s) => s.set_job_handle(execution_id, resume_group_id, call_id, job_handle).await,
            Self::Postgres(s) => s.set_job_handle(execution_id, resume_group_id, call_id, job_handle).await,
        }
    }
}
