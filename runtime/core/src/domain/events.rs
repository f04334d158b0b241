// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Domain Events - Bus Subjects and Payloads
//
// Every event is serialized JSON on a well-known subject. Lifecycle events
// describe agent executions and tasks; market events drive the trade
// settlement subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::domain::execution::ExecutionId;
use crate::domain::task::TaskId;

/// Bus subject namespace.
pub mod subjects {
    /// Task dispatch queue consumed by the agent worker.
    pub const AGENT_TASKS: &str = "agent.tasks";

    pub const EXECUTION_SUCCESS: &str = "agent.execution.success";
    pub const EXECUTION_FAILURE: &str = "agent.execution.failure";
    pub const TASK_COMPLETED: &str = "agent.task.completed";
    pub const TASK_FAILED: &str = "agent.task.failed";

    pub const TRADE_REQUESTED: &str = "market.trade.requested";
    pub const TRADE_ESCROWED: &str = "market.trade.escrowed";
    pub const TRADE_SETTLED: &str = "market.trade.settled";
    pub const TRADE_FAILED: &str = "market.trade.failed";

    /// Wildcard covering everything the runtime publishes; used to size the
    /// JetStream stream.
    pub const ALL: [&str; 9] = [
        AGENT_TASKS,
        EXECUTION_SUCCESS,
        EXECUTION_FAILURE,
        TASK_COMPLETED,
        TASK_FAILED,
        TRADE_REQUESTED,
        TRADE_ESCROWED,
        TRADE_SETTLED,
        TRADE_FAILED,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionSucceeded {
        agent_id: AgentId,
        execution_id: ExecutionId,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    ExecutionFailed {
        agent_id: AgentId,
        execution_id: ExecutionId,
        error: String,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            ExecutionEvent::ExecutionSucceeded { .. } => subjects::EXECUTION_SUCCESS,
            ExecutionEvent::ExecutionFailed { .. } => subjects::EXECUTION_FAILURE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskCompleted {
        execution_id: ExecutionId,
        task_id: TaskId,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    TaskFailed {
        execution_id: ExecutionId,
        task_id: TaskId,
        error: String,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            TaskEvent::TaskCompleted { .. } => subjects::TASK_COMPLETED,
            TaskEvent::TaskFailed { .. } => subjects::TASK_FAILED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    TradeRequested { trade_id: Uuid, at: DateTime<Utc> },
    TradeEscrowed { trade_id: Uuid, at: DateTime<Utc> },
    TradeSettled { trade_id: Uuid, at: DateTime<Utc> },
    TradeFailed { trade_id: Uuid, error: String, at: DateTime<Utc> },
}

impl MarketEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            MarketEvent::TradeRequested { .. } => subjects::TRADE_REQUESTED,
            MarketEvent::TradeEscrowed { .. } => subjects::TRADE_ESCROWED,
            MarketEvent::TradeSettled { .. } => subjects::TRADE_SETTLED,
            MarketEvent::TradeFailed { .. } => subjects::TRADE_FAILED,
        }
    }

    pub fn trade_id(&self) -> Uuid {
        match self {
            MarketEvent::TradeRequested { trade_id, .. }
            | MarketEvent::TradeEscrowed { trade_id, .. }
            | MarketEvent::TradeSettled { trade_id, .. }
            | MarketEvent::TradeFailed { trade_id, .. } => *trade_id,
        }
    }
}
