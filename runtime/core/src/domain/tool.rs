// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Tool Capability Interface (Anti-Corruption Layer)
//
// A Tool is a named, versioned, schema-described capability an agent may
// invoke. The trait is the interface boundary; concrete bodies live in
// infrastructure and may be real integrations or documented fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::agent::{AgentId, AgentType};
use crate::domain::execution::{ExecutionContext, ExecutionId};

/// Closed set of tool categories. `AgentType` → category allow-lists are
/// the capability boundary enforced by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Market,
    Analytics,
    Content,
    Scheduling,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

/// One declared parameter of a tool's argument schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ParameterType,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ToolParameter {
    pub fn required(name: &str, param_type: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: true,
            allowed_values: None,
            default: None,
        }
    }

    pub fn optional(name: &str, param_type: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: false,
            allowed_values: None,
            default: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool call cancelled")]
    Cancelled,
}

/// A named, versioned, schema-validated capability.
///
/// `validate` runs synchronously before execution; the registry falls back
/// to schema-level checks (required parameters, enums) when a tool does not
/// override it.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn description(&self) -> &str;

    fn category(&self) -> ToolCategory;

    fn parameters(&self) -> Vec<ToolParameter>;

    fn validate(&self, args: &serde_json::Value) -> Result<(), ToolError> {
        validate_against_schema(self.name(), &self.parameters(), args)
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, ToolError>;
}

/// Schema-level argument check shared by tools that do not override
/// `validate`: required parameters must be present, enum-constrained
/// parameters must hold an allowed value.
pub fn validate_against_schema(
    tool: &str,
    parameters: &[ToolParameter],
    args: &serde_json::Value,
) -> Result<(), ToolError> {
    let object = args.as_object().ok_or_else(|| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: "arguments must be a JSON object".to_string(),
    })?;

    for param in parameters {
        match object.get(&param.name) {
            None if param.required => {
                return Err(ToolError::InvalidArguments {
                    tool: tool.to_string(),
                    reason: format!("missing required parameter '{}'", param.name),
                });
            }
            Some(value) => {
                if let Some(allowed) = &param.allowed_values {
                    let as_str = value.as_str().unwrap_or_default();
                    if !allowed.iter().any(|v| v == as_str) {
                        return Err(ToolError::InvalidArguments {
                            tool: tool.to_string(),
                            reason: format!(
                                "parameter '{}' must be one of {:?}",
                                param.name, allowed
                            ),
                        });
                    }
                }
            }
            None => {}
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallId(pub Uuid);

impl ToolCallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ToolCallId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolCallStatus {
    Running,
    Success,
    Failure,
}

/// Audit record of one tool invocation. Always references the execution
/// that was RUNNING at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub agent_id: AgentId,
    pub execution_id: ExecutionId,
    pub tool_name: String,
    pub tool_version: String,
    pub arguments: serde_json::Value,
    pub status: ToolCallStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ToolCall {
    pub fn start(
        agent_id: AgentId,
        execution_id: ExecutionId,
        tool_name: impl Into<String>,
        tool_version: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: ToolCallId::new(),
            agent_id,
            execution_id,
            tool_name: tool_name.into(),
            tool_version: tool_version.into(),
            arguments,
            status: ToolCallStatus::Running,
            result: None,
            error: None,
            duration_ms: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn succeed(&mut self, result: serde_json::Value, duration_ms: u64) {
        self.status = ToolCallStatus::Success;
        self.result = Some(result);
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>, duration_ms: u64) {
        self.status = ToolCallStatus::Failure;
        self.error = Some(error.into());
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(Utc::now());
    }
}

/// Capability boundary: agent type → tool categories it may be handed.
pub fn allowed_categories(agent_type: AgentType) -> &'static [ToolCategory] {
    match agent_type {
        AgentType::Market => &[ToolCategory::Market, ToolCategory::Analytics],
        AgentType::Analytics => &[ToolCategory::Analytics, ToolCategory::Market],
        AgentType::Content => &[ToolCategory::Content, ToolCategory::Market],
        AgentType::Scheduler => &[ToolCategory::Scheduling, ToolCategory::System],
        AgentType::Admin => &[ToolCategory::System, ToolCategory::Analytics],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> Vec<ToolParameter> {
        vec![
            ToolParameter::required("category", ParameterType::String, "Product category"),
            ToolParameter {
                allowed_values: Some(vec!["user".into(), "market".into(), "sales".into()]),
                ..ToolParameter::optional("report_type", ParameterType::String, "Report type")
            },
        ]
    }

    #[test]
    fn test_schema_validation_missing_required() {
        let err = validate_against_schema("t", &params(), &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn test_schema_validation_enum() {
        assert!(validate_against_schema(
            "t",
            &params(),
            &json!({"category": "art", "report_type": "sales"})
        )
        .is_ok());

        let err = validate_against_schema(
            "t",
            &params(),
            &json!({"category": "art", "report_type": "bogus"}),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn test_market_allow_list_is_bounded() {
        let allowed = allowed_categories(AgentType::Market);
        assert!(allowed.contains(&ToolCategory::Market));
        assert!(allowed.contains(&ToolCategory::Analytics));
        assert!(!allowed.contains(&ToolCategory::System));
        assert!(!allowed.contains(&ToolCategory::Scheduling));
        assert!(!allowed.contains(&ToolCategory::Content));
    }
}
