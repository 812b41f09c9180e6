// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::{BatchStatus, Store, StoreError};
use crate::domain::{
    Call, CallOutcome, CallRowId, CallStatus, Execution, ExecutionId, ExecutionStatus,
    PendingCallRequest, ResumeGroupId,
};

/// `sqlx`-backed `Store` over the two tables in
/// `cli/migrations/0001_init.sql`. Queries are raw `sqlx::query` (not the
/// `query_as!` macro) so this crate builds without a live database at
/// compile time, matching the rest of the fleet's repositories.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn status_str(status: ExecutionStatus) -> &'static str {
        match status {
            ExecutionStatus::Scheduled => "scheduled",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Waiting => "waiting",
            ExecutionStatus::Resuming => "resuming",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    fn parse_status(s: &str) -> Result<ExecutionStatus, StoreError> {
        Ok(match s {
            "scheduled" => ExecutionStatus::Scheduled,
            "running" => ExecutionStatus::Running,
            "waiting" => ExecutionStatus::Waiting,
            "resuming" => ExecutionStatus::Resuming,
            "completed" => ExecutionStatus::Completed,
            "failed" => ExecutionStatus::Failed,
            other => return Err(StoreError::Backend(format!("unknown execution status '{other}'"))),
        })
    }

    fn call_status_str(status: CallStatus) -> &'static str {
        match status {
            CallStatus::Pending => "pending",
            CallStatus::Running => "running",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
        }
    }

    fn parse_call_status(s: &str) -> Result<CallStatus, StoreError> {
        Ok(match s {
            "pending" => CallStatus::Pending,
            "running" => CallStatus::Running,
            "completed" => CallStatus::Completed,
            "failed" => CallStatus::Failed,
            other => return Err(StoreError::Backend(format!("unknown call status '{other}'"))),
        })
    }

    fn row_to_execution(row: &sqlx::postgres::PgRow) -> Result<Execution, StoreError> {
        let status: String = row.get("status");
        let inputs: Option<serde_json::Value> = row.get("inputs");
        let allowed_functions: serde_json::Value = row.get("allowed_functions");
        let allowed_functions: Vec<String> = serde_json::from_value(allowed_functions)?;
        let resume_group_id: Option<uuid::Uuid> = row.get("current_resume_group_id");
        Ok(Execution {
            id: ExecutionId(row.get("id")),
            code: row.get("code"),
            status: Self::parse_status(&status)?,
            inputs,
            allowed_functions,
            state: row.get("state"),
            resume_group_id: resume_group_id.map(crate::domain::ResumeGroupId),
            result: row.get("result"),
            error: row.get("error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_call(row: &sqlx::postgres::PgRow) -> Result<Call, StoreError> {
        let status: String = row.get("status");
        Ok(Call {
            id: CallRowId(row.get("id")),
            execution_id: ExecutionId(row.get("execution_id")),
            resume_group_id: ResumeGroupId(row.get("resume_group_id")),
            call_id: row.get("call_id"),
            function_name: row.get("function_name"),
            args: row.get("args"),
            status: Self::parse_call_status(&status)?,
            result: row.get("result"),
            error: row.get("error"),
            job_handle: row.get("job_handle"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn create_execution(
        &self,
        code: String,
        allowed_functions: Vec<String>,
        inputs: Option<serde_json::Value>,
    ) -> Result<Execution, StoreError> {
        let execution = Execution::new(code, inputs, allowed_functions);
        sqlx::query(
            "INSERT INTO executions (id, code, status, inputs, allowed_functions, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(execution.id.0)
        .bind(&execution.code)
        .bind(Self::status_str(execution.status))
        .bind(&execution.inputs)
        .bind(serde_json::to_value(&execution.allowed_functions)?)
        .bind(execution.created_at)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(execution)
    }

    async fn claim_scheduled(&self) -> Result<Option<Execution>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT * FROM executions WHERE status = 'scheduled'
             ORDER BY created_at ASC
             FOR UPDATE SKIP LOCKED
             LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let id: uuid::Uuid = row.get("id");
        let updated = sqlx::query(
            "UPDATE executions SET status = 'running', updated_at = now()
             WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(ExecutionId(id)));
        }
        tx.commit().await?;
        self.get_execution(ExecutionId(id)).await.map(Some)
    }

    async fn save_suspension(
        &self,
        execution_id: ExecutionId,
        expected_status: ExecutionStatus,
        state_bytes: Vec<u8>,
        resume_group_id: ResumeGroupId,
        calls: Vec<PendingCallRequest>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE executions
             SET status = 'waiting', state = $1, current_resume_group_id = $2, updated_at = now()
             WHERE id = $3 AND status = $4",
        )
        .bind(&state_bytes)
        .bind(resume_group_id.0)
        .bind(execution_id.0)
        .bind(Self::status_str(expected_status))
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(execution_id));
        }

        for request in calls {
            sqlx::query(
                "INSERT INTO calls (execution_id, resume_group_id, call_id, function_name, args, status, created_at)
                 VALUES ($1, $2, $3, $4, $5, 'pending', now())",
            )
            .bind(execution_id.0)
            .bind(resume_group_id.0)
            .bind(request.call_id)
            .bind(&request.function_name)
            .bind(&request.args)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn complete_call(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        outcome: CallOutcome,
    ) -> Result<(), StoreError> {
        let existing = sqlx::query(
            "SELECT status, result, error FROM calls
             WHERE execution_id = $1 AND resume_group_id = $2 AND call_id = $3",
        )
        .bind(execution_id.0)
        .bind(resume_group_id.0)
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::CallNotFound {
            execution_id,
            resume_group_id,
            call_id,
        })?;

        let current_status = Self::parse_call_status(existing.get::<String, _>("status").as_str())?;
        if current_status.is_terminal() {
            let matches = match (
                existing.get::<Option<serde_json::Value>, _>("result"),
                existing.get::<Option<String>, _>("error"),
                &outcome,
            ) {
                (Some(r), _, CallOutcome::Completed(new)) => &r == new,
                (_, Some(e), CallOutcome::Failed(new)) => &e == new,
                _ => false,
            };
            return if matches {
                Ok(())
            } else {
                Err(StoreError::OutcomeConflict {
                    execution_id,
                    resume_group_id,
                    call_id,
                })
            };
        }

        let (status, result, error): (&str, Option<serde_json::Value>, Option<String>) = match outcome {
            CallOutcome::Completed(v) => ("completed", Some(v), None),
            CallOutcome::Failed(e) => ("failed", None, Some(e)),
        };

        let updated = sqlx::query(
            "UPDATE calls SET status = $1, result = $2, error = $3, completed_at = now()
             WHERE execution_id = $4 AND resume_group_id = $5 AND call_id = $6
               AND status IN ('pending', 'running')",
        )
        .bind(status)
        .bind(&result)
        .bind(&error)
        .bind(execution_id.0)
        .bind(resume_group_id.0)
        .bind(call_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            // Another writer raced us to the same terminal state.
            return Err(StoreError::Conflict(execution_id));
        }
        Ok(())
    }

    async fn batch_status(&self, resume_group_id: ResumeGroupId) -> Result<BatchStatus, StoreError> {
        let row = sqlx::query(
            "SELECT
                count(*) AS total,
                count(*) FILTER (WHERE status = 'completed') AS completed,
                count(*) FILTER (WHERE status = 'failed') AS failed,
                count(*) FILTER (WHERE status IN ('pending', 'running')) AS pending_or_running
             FROM calls WHERE resume_group_id = $1",
        )
        .bind(resume_group_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(BatchStatus {
            total: row.get::<i64, _>("total") as usize,
            completed: row.get::<i64, _>("completed") as usize,
            failed: row.get::<i64, _>("failed") as usize,
            pending_or_running: row.get::<i64, _>("pending_or_running") as usize,
        })
    }

    async fn claim_resume(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
    ) -> Result<bool, StoreError> {
        let status = self.batch_status(resume_group_id).await?;
        if !status.is_fully_terminal() {
            return Ok(false);
        }
        let updated = sqlx::query(
            "UPDATE executions SET status = 'resuming', updated_at = now()
             WHERE id = $1 AND status = 'waiting' AND current_resume_group_id = $2",
        )
        .bind(execution_id.0)
        .bind(resume_group_id.0)
        .execute(&self.pool)
        .await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn load_for_resume(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
    ) -> Result<(Vec<u8>, HashMap<i32, CallOutcome>), StoreError> {
        let exec = self.get_execution(execution_id).await?;
        let state = exec.state.ok_or(StoreError::ExecutionNotFound(execution_id))?;
        let calls = self.get_calls(resume_group_id).await?;
        let mut results = HashMap::new();
        for call in calls {
            let outcome = match (call.result, call.error) {
                (Some(v), _) => CallOutcome::Completed(v),
                (None, Some(e)) => CallOutcome::Failed(e),
                (None, None) => continue,
            };
            results.insert(call.call_id, outcome);
        }
        Ok((state, results))
    }

    async fn finish(
        &self,
        execution_id: ExecutionId,
        result: Result<serde_json::Value, String>,
    ) -> Result<(), StoreError> {
        let (status, output, error): (&str, Option<serde_json::Value>, Option<String>) = match result {
            Ok(value) => ("completed", Some(value), None),
            Err(e) => ("failed", None, Some(e)),
        };
        let updated = sqlx::query(
            "UPDATE executions
             SET status = $1, result = $2, error = $3, state = NULL, current_resume_group_id = NULL, updated_at = now()
             WHERE id = $4 AND status IN ('running', 'resuming')",
        )
        .bind(status)
        .bind(&output)
        .bind(&error)
        .bind(execution_id.0)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict(execution_id));
        }
        Ok(())
    }

    async fn get_execution(&self, execution_id: ExecutionId) -> Result<Execution, StoreError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = $1")
            .bind(execution_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;
        Self::row_to_execution(&row)
    }

    async fn get_calls(&self, resume_group_id: ResumeGroupId) -> Result<Vec<Call>, StoreError> {
        let rows = sqlx::query("SELECT * FROM calls WHERE resume_group_id = $1 ORDER BY call_id ASC")
            .bind(resume_group_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_call).collect()
    }

    async fn list_waiting(&self) -> Result<Vec<Execution>, StoreError> {
        let rows = sqlx::query("SELECT * FROM executions WHERE status = 'waiting'")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn find_call_by_job_handle(
        &self,
        job_handle: &str,
    ) -> Result<Option<(ExecutionId, ResumeGroupId, i32)>, StoreError> {
        let row = sqlx::query(
            "SELECT execution_id, resume_group_id, call_id FROM calls WHERE job_handle = $1",
        )
        .bind(job_handle)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| {
            (
                ExecutionId(r.get("execution_id")),
                ResumeGroupId(r.get("resume_group_id")),
                r.get("call_id"),
            )
        }))
    }

    async fn set_job_handle(
        &self,
        execution_id: ExecutionId,
        resume_group_id: ResumeGroupId,
        call_id: i32,
        job_handle: String,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE calls SET job_handle = $1
             WHERE execution_id = $2 AND resume_group_id = $3 AND call_id = $4",
        )
        .bind(job_handle)
        .bind(execution_id.0)
        .bind(resume_group_id.0)
        .bind(call_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
