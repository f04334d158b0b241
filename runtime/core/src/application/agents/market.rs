// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{error, info};

use crate::application::agent_runtime::{AgentBehavior, AgentError, AgentServices};
use crate::domain::agent::AgentType;
use crate::domain::execution::{ExecutionContext, ExecutionResult, TokenUsage};

/// Marketplace analysis behavior: pricing trends, listing creation, and
/// competitive intelligence over the market tool set.
pub struct MarketAgent;

#[async_trait]
impl AgentBehavior for MarketAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Market
    }

    async fn on_initialize(&self) -> Result<(), AgentError> {
        info!("initializing market agent");
        Ok(())
    }

    async fn on_preprocess(&self, input: Value) -> Result<Value, AgentError> {
        if input.get("action").and_then(Value::as_str).is_none() {
            return Err(AgentError::Validation(
                "Market action not specified".to_string(),
            ));
        }
        let mut input = input;
        if let Some(object) = input.as_object_mut() {
            object.insert("timestamp".to_string(), json!(Utc::now()));
        }
        Ok(input)
    }

    async fn on_execute(
        &self,
        input: &Value,
        ctx: &ExecutionContext,
        services: &AgentServices,
    ) -> Result<ExecutionResult, AgentError> {
        let action = input
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let started = Instant::now();
        let mut token_usage = TokenUsage::default();

        let output = match action {
            "analyze_market" => {
                let category = input
                    .get("category")
                    .and_then(Value::as_str)
                    .unwrap_or("general");
                let analysis = services
                    .call_tool("analyze_market_price", json!({ "category": category }), ctx)
                    .await?;

                let summary = services
                    .call_ai(&format!(
                        "Summarize the pricing outlook for the '{}' category given: {}",
                        category, analysis
                    ))
                    .await?;
                token_usage = summary.usage;

                json!({
                    "action": action,
                    "category": category,
                    "analysis": analysis,
                    "summary": summary.text,
                })
            }
            "create_listing" => {
                let created = services
                    .call_tool(
                        "create_listing",
                        json!({
                            "title": input.get("title").cloned().unwrap_or(Value::Null),
                            "price": input.get("price").cloned().unwrap_or(Value::Null),
                        }),
                        ctx,
                    )
                    .await?;
                json!({ "action": action, "listing": created })
            }
            other => {
                return Err(AgentError::Execution(format!(
                    "Unknown market action: {}",
                    other
                )))
            }
        };

        Ok(ExecutionResult {
            output,
            reasoning: None,
            token_usage,
            cost_usd: token_usage.total as f64 * 1e-6,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn on_error(&self, error: &AgentError, _ctx: &ExecutionContext) {
        error!(error = %error, "market agent execution failed");
    }
}
