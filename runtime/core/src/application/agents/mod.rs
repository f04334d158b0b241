// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod market;
pub mod ops;

use std::sync::Arc;

use crate::application::agent_runtime::AgentBehavior;
use crate::domain::agent::AgentType;

pub use market::MarketAgent;
pub use ops::{AdminAgent, AnalyticsAgent, ContentAgent, SchedulerAgent};

/// Behavior for an agent type. Exhaustive: adding a type without a behavior
/// fails to compile.
pub fn behavior_for(agent_type: AgentType) -> Arc<dyn AgentBehavior> {
    match agent_type {
        AgentType::Market => Arc::new(MarketAgent),
        AgentType::Analytics => Arc::new(AnalyticsAgent),
        AgentType::Content => Arc::new(ContentAgent),
        AgentType::Scheduler => Arc::new(SchedulerAgent),
        AgentType::Admin => Arc::new(AdminAgent),
    }
}
