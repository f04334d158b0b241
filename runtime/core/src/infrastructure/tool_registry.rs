// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Tool Registry - Boot-Time Catalog of Agent Capabilities
//
// Populated once at process boot and read-only afterwards, so concurrent
// lookups need no locking. `tools_for_agent` enforces the capability
// boundary: an agent type is only ever handed tools from its allow-listed
// categories, no matter what else is registered.
//
// Built-in tool bodies are deliberately thin: `get_listings` is a real
// read through the market repository; the rest return documented fixed
// shapes behind the `Tool` interface until their integrations land.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::agent::AgentType;
use crate::domain::execution::ExecutionContext;
use crate::domain::market::ListingStatus;
use crate::domain::repository::MarketRepository;
use crate::domain::tool::{
    allowed_categories, ParameterType, Tool, ToolCategory, ToolError, ToolParameter,
};

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        debug!(tool = tool.name(), category = ?tool.category(), "registered tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self, category: Option<ToolCategory>) -> Vec<Arc<dyn Tool>> {
        self.tools
            .values()
            .filter(|t| category.is_none_or(|c| t.category() == c))
            .cloned()
            .collect()
    }

    /// Tools an agent type may be handed. This is the capability boundary:
    /// categories outside the allow-list never leak through, even when
    /// globally registered.
    pub fn tools_for_agent(&self, agent_type: AgentType) -> Vec<Arc<dyn Tool>> {
        let categories = allowed_categories(agent_type);
        self.tools
            .values()
            .filter(|t| categories.contains(&t.category()))
            .cloned()
            .collect()
    }
}

/// Register the built-in tool catalog. Called once during boot.
pub fn builtin_registry(market: Arc<dyn MarketRepository>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(GetListingsTool { market }));
    registry.register(Arc::new(fixed(
        "analyze_market_price",
        ToolCategory::Market,
        "Analyze market trends",
        vec![ToolParameter::required(
            "category",
            ParameterType::String,
            "Product category",
        )],
        json!({ "trend_direction": "up", "avg_price_cents": 0 }),
    )));
    registry.register(Arc::new(fixed(
        "create_listing",
        ToolCategory::Market,
        "Create marketplace listing",
        vec![
            ToolParameter::required("title", ParameterType::String, "Listing title"),
            ToolParameter::required("price", ParameterType::Number, "Price in USD"),
        ],
        json!({ "listing_id": null, "status": "ACTIVE" }),
    )));
    registry.register(Arc::new(fixed(
        "get_user_metrics",
        ToolCategory::Analytics,
        "Get user activity metrics",
        vec![ToolParameter::required(
            "user_id",
            ParameterType::String,
            "User ID",
        )],
        json!({ "active_rate": 0.0, "engagement_score": 0.0 }),
    )));
    registry.register(Arc::new(fixed(
        "generate_report",
        ToolCategory::Analytics,
        "Generate analytics report",
        vec![ToolParameter {
            allowed_values: Some(vec!["user".into(), "market".into(), "sales".into()]),
            ..ToolParameter::required("report_type", ParameterType::String, "Report type")
        }],
        json!({ "report_id": null, "metrics": {} }),
    )));
    registry.register(Arc::new(fixed(
        "generate_content",
        ToolCategory::Content,
        "Generate marketing content",
        vec![
            ToolParameter {
                allowed_values: Some(vec![
                    "title".into(),
                    "description".into(),
                    "social_post".into(),
                    "email".into(),
                ]),
                ..ToolParameter::required("content_type", ParameterType::String, "Content type")
            },
            ToolParameter::required("topic", ParameterType::String, "Content topic"),
        ],
        json!({ "content": "", "token_usage": { "input": 0, "output": 0 } }),
    )));
    registry.register(Arc::new(fixed(
        "curate_content",
        ToolCategory::Content,
        "Curate content collection",
        vec![ToolParameter::required(
            "content_ids",
            ParameterType::Array,
            "Content IDs",
        )],
        json!({ "collection_id": null }),
    )));
    registry.register(Arc::new(fixed(
        "schedule_task",
        ToolCategory::Scheduling,
        "Schedule task execution",
        vec![
            ToolParameter::required("task_name", ParameterType::String, "Task identifier"),
            ToolParameter::required("schedule", ParameterType::String, "Cron expression"),
        ],
        json!({ "schedule_id": null, "status": "SCHEDULED" }),
    )));
    registry.register(Arc::new(fixed(
        "get_system_health",
        ToolCategory::System,
        "Check system health",
        vec![],
        json!({ "status": "healthy" }),
    )));
    registry.register(Arc::new(fixed(
        "send_notification",
        ToolCategory::System,
        "Send user notification",
        vec![
            ToolParameter::required("user_id", ParameterType::String, "User ID"),
            ToolParameter::required("message", ParameterType::String, "Notification message"),
        ],
        json!({ "sent": true }),
    )));

    registry
}

/// Retrieve active marketplace listings through the market repository.
struct GetListingsTool {
    market: Arc<dyn MarketRepository>,
}

#[async_trait]
impl Tool for GetListingsTool {
    fn name(&self) -> &str {
        "get_listings"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn description(&self) -> &str {
        "Retrieve active marketplace listings"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Market
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::optional(
            "listing_id",
            ParameterType::String,
            "Restrict to a single listing",
        )]
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        _ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let listing_id = args
            .get("listing_id")
            .and_then(|v| v.as_str())
            .and_then(|s| uuid::Uuid::parse_str(s).ok());

        let listings = match listing_id {
            Some(id) => self
                .market
                .find_listing(id)
                .await
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?
                .into_iter()
                .collect::<Vec<_>>(),
            // Without a filter the registry only exposes shape, not a full
            // scan; scans belong to a dedicated query surface.
            None => Vec::new(),
        };

        let active: Vec<_> = listings
            .iter()
            .filter(|l| l.status == ListingStatus::Active)
            .map(|l| {
                json!({
                    "id": l.id,
                    "asset_id": l.asset_id,
                    "price_cents": l.price_cents,
                    "shares": l.shares,
                })
            })
            .collect();

        Ok(json!({ "listings": active, "total": active.len() }))
    }
}

/// A tool whose body returns a documented fixed shape. Used for catalog
/// entries whose real integrations live outside this runtime.
struct FixedResponseTool {
    name: &'static str,
    category: ToolCategory,
    description: &'static str,
    parameters: Vec<ToolParameter>,
    response: serde_json::Value,
}

fn fixed(
    name: &'static str,
    category: ToolCategory,
    description: &'static str,
    parameters: Vec<ToolParameter>,
    response: serde_json::Value,
) -> FixedResponseTool {
    FixedResponseTool {
        name,
        category,
        description,
        parameters,
        response,
    }
}

#[async_trait]
impl Tool for FixedResponseTool {
    fn name(&self) -> &str {
        self.name
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn description(&self) -> &str {
        self.description
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        self.parameters.clone()
    }

    async fn execute(
        &self,
        _args: serde_json::Value,
        _ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let mut response = self.response.clone();
        if let Some(object) = response.as_object_mut() {
            object.insert("generated_at".to_string(), json!(Utc::now()));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::memory::InMemoryMarketRepository;

    fn registry() -> ToolRegistry {
        builtin_registry(Arc::new(InMemoryMarketRepository::new()))
    }

    #[test]
    fn test_lookup_and_listing() {
        let registry = registry();
        assert!(registry.get("get_listings").is_some());
        assert!(registry.get("no_such_tool").is_none());
        assert_eq!(registry.list(Some(ToolCategory::Market)).len(), 3);
    }

    #[test]
    fn test_market_agent_never_sees_out_of_category_tools() {
        let registry = registry();
        let allowed = [ToolCategory::Market, ToolCategory::Analytics];
        for tool in registry.tools_for_agent(AgentType::Market) {
            assert!(
                allowed.contains(&tool.category()),
                "tool {} leaked category {:?}",
                tool.name(),
                tool.category()
            );
        }
    }

    #[test]
    fn test_scheduler_gets_scheduling_and_system() {
        let registry = registry();
        let names: Vec<String> = registry
            .tools_for_agent(AgentType::Scheduler)
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert!(names.contains(&"schedule_task".to_string()));
        assert!(names.contains(&"get_system_health".to_string()));
        assert!(!names.contains(&"create_listing".to_string()));
    }

    #[tokio::test]
    async fn test_fixed_tool_validates_enum() {
        let registry = registry();
        let tool = registry.get("generate_report").unwrap();
        assert!(tool.validate(&json!({"report_type": "sales"})).is_ok());
        assert!(tool.validate(&json!({"report_type": "bogus"})).is_err());
    }
}
