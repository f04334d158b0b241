// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::agent::{Agent, AgentId, AgentModelConfig, AgentStatus, AgentType};
use crate::domain::repository::{AgentRepository, RepositoryError};

pub struct PostgresAgentRepository {
    pool: PgPool,
}

impl PostgresAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Active => "active",
        AgentStatus::Paused => "paused",
        AgentStatus::Archived => "archived",
    }
}

fn parse_status(s: &str) -> AgentStatus {
    match s {
        "paused" => AgentStatus::Paused,
        "archived" => AgentStatus::Archived,
        _ => AgentStatus::Active,
    }
}

fn row_to_agent(row: &sqlx::postgres::PgRow) -> Result<Agent, RepositoryError> {
    let agent_type: String = row.get("agent_type");
    let status: String = row.get("status");
    let capabilities: serde_json::Value = row.get("capabilities");
    Ok(Agent {
        id: AgentId(row.get("id")),
        name: row.get("name"),
        agent_type: agent_type
            .parse::<AgentType>()
            .map_err(RepositoryError::Serialization)?,
        description: row.get("description"),
        system_prompt: row.get("system_prompt"),
        status: parse_status(&status),
        model_config: AgentModelConfig {
            model: row.get("model"),
            temperature: row.get::<f64, _>("temperature") as f32,
            max_tokens: row.get::<i32, _>("max_tokens") as u32,
        },
        capabilities: serde_json::from_value(capabilities)?,
        total_executions: row.get::<i64, _>("total_executions") as u64,
        success_count: row.get::<i64, _>("success_count") as u64,
        failure_count: row.get::<i64, _>("failure_count") as u64,
        last_executed_at: row.get("last_executed_at"),
        average_latency_ms: row.get("average_latency_ms"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        let capabilities = serde_json::to_value(&agent.capabilities)?;

        sqlx::query(
            r#"
            INSERT INTO agents (
                id, name, agent_type, description, system_prompt, status,
                model, temperature, max_tokens, capabilities,
                total_executions, success_count, failure_count,
                last_executed_at, average_latency_ms, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                system_prompt = EXCLUDED.system_prompt,
                status = EXCLUDED.status,
                model = EXCLUDED.model,
                temperature = EXCLUDED.temperature,
                max_tokens = EXCLUDED.max_tokens,
                capabilities = EXCLUDED.capabilities,
                total_executions = EXCLUDED.total_executions,
                success_count = EXCLUDED.success_count,
                failure_count = EXCLUDED.failure_count,
                last_executed_at = EXCLUDED.last_executed_at,
                average_latency_ms = EXCLUDED.average_latency_ms,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(agent.id.0)
        .bind(&agent.name)
        .bind(agent.agent_type.as_str())
        .bind(&agent.description)
        .bind(&agent.system_prompt)
        .bind(status_str(agent.status))
        .bind(&agent.model_config.model)
        .bind(agent.model_config.temperature as f64)
        .bind(agent.model_config.max_tokens as i32)
        .bind(capabilities)
        .bind(agent.total_executions as i64)
        .bind(agent.success_count as i64)
        .bind(agent.failure_count as i64)
        .bind(agent.last_executed_at)
        .bind(agent.average_latency_ms)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save agent: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_agent).transpose()
    }

    async fn find_active_by_type(
        &self,
        agent_type: AgentType,
    ) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT * FROM agents WHERE agent_type = $1 AND status = 'active' LIMIT 1",
        )
        .bind(agent_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_agent).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_agent).collect()
    }
}
