// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::{AgentId, AgentType};
use crate::domain::execution::ExecutionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A unit of work addressed to an agent. Created by a producer (HTTP
/// handler or scheduler), moved to exactly one terminal state by the
/// worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: TaskId,
    pub agent_id: AgentId,
    pub action: String,
    pub input: serde_json::Value,
    pub status: TaskStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub execution_time_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    pub fn new(agent_id: AgentId, action: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: TaskId::new(),
            agent_id,
            action: action.into(),
            input,
            status: TaskStatus::Pending,
            output: None,
            error: None,
            execution_time_ms: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
    }

    pub fn complete(&mut self, output: serde_json::Value, execution_time_ms: u64) {
        self.status = TaskStatus::Completed;
        self.output = Some(output);
        self.execution_time_ms = Some(execution_time_ms);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// Wire envelope published to `agent.tasks` and decoded by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTaskMessage {
    pub execution_id: ExecutionId,
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub agent_type: AgentType,
    pub action: String,
    pub input: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
