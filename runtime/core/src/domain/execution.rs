// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Running,
    Success,
    Failure,
}

/// Token accounting for one execution, summed across attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

impl TokenUsage {
    pub fn new(input: u32, output: u32) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

/// Per-call context threaded through the hook pipeline and every tool
/// invocation.
///
/// `cancellation` is cancelled by the harness when an attempt times out or
/// the runtime shuts down; cooperative implementations of `on_execute` and
/// tool `execute` should stop work when it fires.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub agent_id: AgentId,
    pub task_id: Option<TaskId>,
    /// Pre-created execution row to resume (set by the worker, whose task
    /// envelope carries the id minted at enqueue time). When unset the
    /// harness mints a fresh row.
    pub execution_id: Option<ExecutionId>,
    pub user_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub attempt_number: u32,
    pub metadata: HashMap<String, serde_json::Value>,
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            task_id: None,
            execution_id: None,
            user_id: None,
            timestamp: Utc::now(),
            attempt_number: 1,
            metadata: HashMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_execution(mut self, execution_id: ExecutionId) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Outcome of one agent execution, produced by `on_execute` and shaped by
/// `on_postprocess`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: serde_json::Value,
    pub reasoning: Option<String>,
    pub token_usage: TokenUsage,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

/// Audit/telemetry record of one `execute` call. Retries within the call
/// are attempts inside this single record, never new rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    pub id: ExecutionId,
    pub agent_id: AgentId,
    pub task_id: Option<TaskId>,
    pub input: serde_json::Value,
    pub context: serde_json::Value,
    pub system_prompt_used: String,
    pub model_used: String,
    pub status: ExecutionStatus,
    pub output: Option<serde_json::Value>,
    pub reasoning: Option<String>,
    pub error: Option<String>,
    pub token_usage: TokenUsage,
    pub cost_usd: f64,
    pub duration_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentExecution {
    pub fn start(
        agent_id: AgentId,
        task_id: Option<TaskId>,
        input: serde_json::Value,
        context: serde_json::Value,
        system_prompt_used: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            agent_id,
            task_id,
            input,
            context,
            system_prompt_used: system_prompt_used.into(),
            model_used: model_used.into(),
            status: ExecutionStatus::Running,
            output: None,
            reasoning: None,
            error: None,
            token_usage: TokenUsage::default(),
            cost_usd: 0.0,
            duration_ms: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn succeed(&mut self, result: &ExecutionResult, duration_ms: u64) {
        self.status = ExecutionStatus::Success;
        self.output = Some(result.output.clone());
        self.reasoning = result.reasoning.clone();
        self.token_usage = result.token_usage;
        self.cost_usd = result.cost_usd;
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>, duration_ms: u64) {
        self.status = ExecutionStatus::Failure;
        self.error = Some(error.into());
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(Utc::now());
    }
}
