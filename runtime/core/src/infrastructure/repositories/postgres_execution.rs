// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::agent::AgentId;
use crate::domain::execution::{AgentExecution, ExecutionId, ExecutionStatus, TokenUsage};
use crate::domain::repository::{
    ExecutionRepository, RepositoryError, TaskRepository, ToolCallRepository,
};
use crate::domain::task::{AgentTask, TaskId, TaskStatus};
use crate::domain::tool::{ToolCall, ToolCallId, ToolCallStatus};

pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "running" => TaskStatus::Running,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> AgentTask {
    let status: String = row.get("status");
    AgentTask {
        id: TaskId(row.get("id")),
        agent_id: AgentId(row.get("agent_id")),
        action: row.get("action"),
        input: row.get("input"),
        status: parse_task_status(&status),
        output: row.get("output"),
        error: row.get("error"),
        execution_time_ms: row
            .get::<Option<i64>, _>("execution_time_ms")
            .map(|v| v as u64),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn save(&self, task: &AgentTask) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO agent_tasks (
                id, agent_id, action, input, status, output, error,
                execution_time_ms, created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                output = EXCLUDED.output,
                error = EXCLUDED.error,
                execution_time_ms = EXCLUDED.execution_time_ms,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(task.id.0)
        .bind(task.agent_id.0)
        .bind(&task.action)
        .bind(&task.input)
        .bind(task_status_str(task.status))
        .bind(&task.output)
        .bind(&task.error)
        .bind(task.execution_time_ms.map(|v| v as i64))
        .bind(task.created_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save task: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Option<AgentTask>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM agent_tasks WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_task))
    }
}

pub struct PostgresExecutionRepository {
    pool: PgPool,
}

impl PostgresExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn execution_status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Success => "success",
        ExecutionStatus::Failure => "failure",
    }
}

fn parse_execution_status(s: &str) -> ExecutionStatus {
    match s {
        "success" => ExecutionStatus::Success,
        "failure" => ExecutionStatus::Failure,
        _ => ExecutionStatus::Running,
    }
}

fn row_to_execution(row: &sqlx::postgres::PgRow) -> AgentExecution {
    let status: String = row.get("status");
    AgentExecution {
        id: ExecutionId(row.get("id")),
        agent_id: AgentId(row.get("agent_id")),
        task_id: row.get::<Option<uuid::Uuid>, _>("task_id").map(TaskId),
        input: row.get("input"),
        context: row.get("context"),
        system_prompt_used: row.get("system_prompt_used"),
        model_used: row.get("model_used"),
        status: parse_execution_status(&status),
        output: row.get("output"),
        reasoning: row.get("reasoning"),
        error: row.get("error"),
        token_usage: TokenUsage {
            input: row.get::<i32, _>("input_tokens") as u32,
            output: row.get::<i32, _>("output_tokens") as u32,
            total: row.get::<i32, _>("total_tokens") as u32,
        },
        cost_usd: row.get("cost_usd"),
        duration_ms: row.get::<Option<i64>, _>("duration_ms").map(|v| v as u64),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    }
}

#[async_trait]
impl ExecutionRepository for PostgresExecutionRepository {
    async fn save(&self, execution: &AgentExecution) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO agent_executions (
                id, agent_id, task_id, input, context, system_prompt_used,
                model_used, status, output, reasoning, error,
                input_tokens, output_tokens, total_tokens, cost_usd,
                duration_ms, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                output = EXCLUDED.output,
                reasoning = EXCLUDED.reasoning,
                error = EXCLUDED.error,
                input_tokens = EXCLUDED.input_tokens,
                output_tokens = EXCLUDED.output_tokens,
                total_tokens = EXCLUDED.total_tokens,
                cost_usd = EXCLUDED.cost_usd,
                duration_ms = EXCLUDED.duration_ms,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(execution.id.0)
        .bind(execution.agent_id.0)
        .bind(execution.task_id.map(|t| t.0))
        .bind(&execution.input)
        .bind(&execution.context)
        .bind(&execution.system_prompt_used)
        .bind(&execution.model_used)
        .bind(execution_status_str(execution.status))
        .bind(&execution.output)
        .bind(&execution.reasoning)
        .bind(&execution.error)
        .bind(execution.token_usage.input as i32)
        .bind(execution.token_usage.output as i32)
        .bind(execution.token_usage.total as i32)
        .bind(execution.cost_usd)
        .bind(execution.duration_ms.map(|v| v as i64))
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save execution: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<AgentExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM agent_executions WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_execution))
    }

    async fn find_by_agent(&self, agent_id: AgentId) -> Result<Vec<AgentExecution>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM agent_executions WHERE agent_id = $1 ORDER BY started_at DESC",
        )
        .bind(agent_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_execution).collect())
    }
}

pub struct PostgresToolCallRepository {
    pool: PgPool,
}

impl PostgresToolCallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn tool_call_status_str(status: ToolCallStatus) -> &'static str {
    match status {
        ToolCallStatus::Running => "running",
        ToolCallStatus::Success => "success",
        ToolCallStatus::Failure => "failure",
    }
}

fn parse_tool_call_status(s: &str) -> ToolCallStatus {
    match s {
        "success" => ToolCallStatus::Success,
        "failure" => ToolCallStatus::Failure,
        _ => ToolCallStatus::Running,
    }
}

fn row_to_tool_call(row: &sqlx::postgres::PgRow) -> ToolCall {
    let status: String = row.get("status");
    ToolCall {
        id: ToolCallId(row.get("id")),
        agent_id: AgentId(row.get("agent_id")),
        execution_id: ExecutionId(row.get("execution_id")),
        tool_name: row.get("tool_name"),
        tool_version: row.get("tool_version"),
        arguments: row.get("arguments"),
        status: parse_tool_call_status(&status),
        result: row.get("result"),
        error: row.get("error"),
        duration_ms: row.get::<Option<i64>, _>("duration_ms").map(|v| v as u64),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    }
}

#[async_trait]
impl ToolCallRepository for PostgresToolCallRepository {
    async fn save(&self, call: &ToolCall) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO tool_calls (
                id, agent_id, execution_id, tool_name, tool_version,
                arguments, status, result, error, duration_ms,
                created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                result = EXCLUDED.result,
                error = EXCLUDED.error,
                duration_ms = EXCLUDED.duration_ms,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(call.id.0)
        .bind(call.agent_id.0)
        .bind(call.execution_id.0)
        .bind(&call.tool_name)
        .bind(&call.tool_version)
        .bind(&call.arguments)
        .bind(tool_call_status_str(call.status))
        .bind(&call.result)
        .bind(&call.error)
        .bind(call.duration_ms.map(|v| v as i64))
        .bind(call.created_at)
        .bind(call.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save tool call: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: ToolCallId) -> Result<Option<ToolCall>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM tool_calls WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_tool_call))
    }

    async fn find_by_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<ToolCall>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM tool_calls WHERE execution_id = $1 ORDER BY created_at",
        )
        .bind(execution_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_tool_call).collect())
    }
}
