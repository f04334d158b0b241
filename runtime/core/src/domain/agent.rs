// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Closed set of agent behaviors. Adding a variant forces every dispatch
/// site (worker, tool allow-lists, seeding) through exhaustive matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentType {
    Market,
    Analytics,
    Content,
    Scheduler,
    Admin,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::Market,
        AgentType::Analytics,
        AgentType::Content,
        AgentType::Scheduler,
        AgentType::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Market => "MARKET",
            AgentType::Analytics => "ANALYTICS",
            AgentType::Content => "CONTENT",
            AgentType::Scheduler => "SCHEDULER",
            AgentType::Admin => "ADMIN",
        }
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(AgentType::Market),
            "ANALYTICS" => Ok(AgentType::Analytics),
            "CONTENT" => Ok(AgentType::Content),
            "SCHEDULER" => Ok(AgentType::Scheduler),
            "ADMIN" => Ok(AgentType::Admin),
            other => Err(format!("unknown agent type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Active,
    Paused,
    Archived,
}

/// Model parameters an agent executes with. Defaults come from `Settings`;
/// individual agents may override at seeding time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentModelConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AgentModelConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// A deployed agent definition plus its execution counters.
///
/// Counters are mutated by the worker after every execution; agents are
/// deactivated (`Archived`), never hard-deleted, so history rows keep a
/// valid owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub agent_type: AgentType,
    pub description: String,
    pub system_prompt: String,
    pub status: AgentStatus,
    pub model_config: AgentModelConfig,
    pub capabilities: Vec<String>,
    pub total_executions: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub average_latency_ms: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        agent_type: AgentType,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        model_config: AgentModelConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            name: name.into(),
            agent_type,
            description: description.into(),
            system_prompt: system_prompt.into(),
            status: AgentStatus::Active,
            model_config,
            capabilities: vec![
                "autonomous-execution".to_string(),
                "tool-calling".to_string(),
                "report-generation".to_string(),
            ],
            total_executions: 0,
            success_count: 0,
            failure_count: 0,
            last_executed_at: None,
            average_latency_ms: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pause(&mut self) {
        self.status = AgentStatus::Paused;
        self.updated_at = Utc::now();
    }

    pub fn resume(&mut self) {
        self.status = AgentStatus::Active;
        self.updated_at = Utc::now();
    }

    pub fn archive(&mut self) {
        self.status = AgentStatus::Archived;
        self.updated_at = Utc::now();
    }

    /// Fold one finished execution into the counters and the rolling
    /// average latency (cumulative moving average over total executions).
    pub fn record_execution(&mut self, success: bool, duration_ms: u64) {
        self.total_executions += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        let n = self.total_executions as f64;
        self.average_latency_ms += (duration_ms as f64 - self.average_latency_ms) / n;
        self.last_executed_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_round_trip() {
        for t in AgentType::ALL {
            assert_eq!(t.as_str().parse::<AgentType>().unwrap(), t);
        }
        assert!("ROGUE".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_record_execution_updates_rolling_average() {
        let mut agent = Agent::new(
            "Market Intelligence Agent",
            AgentType::Market,
            "Analyzes marketplace trends",
            "You are an expert marketplace analyst.",
            AgentModelConfig::default(),
        );

        agent.record_execution(true, 100);
        agent.record_execution(true, 300);
        agent.record_execution(false, 200);

        assert_eq!(agent.total_executions, 3);
        assert_eq!(agent.success_count, 2);
        assert_eq!(agent.failure_count, 1);
        assert!((agent.average_latency_ms - 200.0).abs() < f64::EPSILON);
        assert!(agent.last_executed_at.is_some());
    }
}
