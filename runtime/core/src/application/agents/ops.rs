// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Analytics, content, scheduler, and admin behaviors. Thinner than the
// market agent: each validates its action, drives its allow-listed tools,
// and shapes a stable output contract.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::application::agent_runtime::{AgentBehavior, AgentError, AgentServices};
use crate::domain::agent::AgentType;
use crate::domain::execution::{ExecutionContext, ExecutionResult, TokenUsage};

fn action_of<'a>(input: &'a Value, agent: &str) -> Result<&'a str, AgentError> {
    input
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::Validation(format!("{} action not specified", agent)))
}

fn result(output: Value, token_usage: TokenUsage, started: Instant) -> ExecutionResult {
    ExecutionResult {
        output,
        reasoning: None,
        token_usage,
        cost_usd: token_usage.total as f64 * 1e-6,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Report generation over the analytics tool set.
pub struct AnalyticsAgent;

#[async_trait]
impl AgentBehavior for AnalyticsAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Analytics
    }

    async fn on_preprocess(&self, input: Value) -> Result<Value, AgentError> {
        action_of(&input, "Analytics")?;
        Ok(input)
    }

    async fn on_execute(
        &self,
        input: &Value,
        ctx: &ExecutionContext,
        services: &AgentServices,
    ) -> Result<ExecutionResult, AgentError> {
        let started = Instant::now();
        match action_of(input, "Analytics")? {
            "generate_report" => {
                let report_type = input
                    .get("report_type")
                    .and_then(Value::as_str)
                    .unwrap_or("market");
                let report = services
                    .call_tool("generate_report", json!({ "report_type": report_type }), ctx)
                    .await?;
                Ok(result(
                    json!({ "action": "generate_report", "report": report }),
                    TokenUsage::default(),
                    started,
                ))
            }
            other => Err(AgentError::Execution(format!(
                "Unknown analytics action: {}",
                other
            ))),
        }
    }
}

/// Marketing copy generation through the model backend.
pub struct ContentAgent;

#[async_trait]
impl AgentBehavior for ContentAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Content
    }

    async fn on_preprocess(&self, input: Value) -> Result<Value, AgentError> {
        action_of(&input, "Content")?;
        if input.get("topic").and_then(Value::as_str).is_none() {
            return Err(AgentError::Validation("Content topic required".to_string()));
        }
        Ok(input)
    }

    async fn on_execute(
        &self,
        input: &Value,
        _ctx: &ExecutionContext,
        services: &AgentServices,
    ) -> Result<ExecutionResult, AgentError> {
        let started = Instant::now();
        match action_of(input, "Content")? {
            "generate_content" => {
                let topic = input.get("topic").and_then(Value::as_str).unwrap_or_default();
                let content_type = input
                    .get("content_type")
                    .and_then(Value::as_str)
                    .unwrap_or("description");
                let generated = services
                    .call_ai(&format!("Write a {} about: {}", content_type, topic))
                    .await?;
                Ok(result(
                    json!({
                        "action": "generate_content",
                        "content_type": content_type,
                        "content": generated.text,
                    }),
                    generated.usage,
                    started,
                ))
            }
            other => Err(AgentError::Execution(format!(
                "Unknown content action: {}",
                other
            ))),
        }
    }
}

/// Scheduled-task management over the scheduling tool set.
pub struct SchedulerAgent;

#[async_trait]
impl AgentBehavior for SchedulerAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Scheduler
    }

    async fn on_preprocess(&self, input: Value) -> Result<Value, AgentError> {
        action_of(&input, "Scheduler")?;
        Ok(input)
    }

    async fn on_execute(
        &self,
        input: &Value,
        ctx: &ExecutionContext,
        services: &AgentServices,
    ) -> Result<ExecutionResult, AgentError> {
        let started = Instant::now();
        match action_of(input, "Scheduler")? {
            "schedule_task" => {
                let scheduled = services
                    .call_tool(
                        "schedule_task",
                        json!({
                            "task_name": input.get("task_name").cloned().unwrap_or(Value::Null),
                            "schedule": input.get("schedule").cloned().unwrap_or(Value::Null),
                        }),
                        ctx,
                    )
                    .await?;
                Ok(result(
                    json!({ "action": "schedule_task", "scheduled": scheduled }),
                    TokenUsage::default(),
                    started,
                ))
            }
            other => Err(AgentError::Execution(format!(
                "Unknown scheduler action: {}",
                other
            ))),
        }
    }
}

/// System monitoring over the system tool set.
pub struct AdminAgent;

#[async_trait]
impl AgentBehavior for AdminAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Admin
    }

    async fn on_preprocess(&self, input: Value) -> Result<Value, AgentError> {
        action_of(&input, "Admin")?;
        Ok(input)
    }

    async fn on_execute(
        &self,
        input: &Value,
        ctx: &ExecutionContext,
        services: &AgentServices,
    ) -> Result<ExecutionResult, AgentError> {
        let started = Instant::now();
        match action_of(input, "Admin")? {
            "system_health" => {
                let health = services.call_tool("get_system_health", json!({}), ctx).await?;
                Ok(result(
                    json!({ "action": "system_health", "health": health }),
                    TokenUsage::default(),
                    started,
                ))
            }
            other => Err(AgentError::Execution(format!(
                "Unknown admin action: {}",
                other
            ))),
        }
    }
}
