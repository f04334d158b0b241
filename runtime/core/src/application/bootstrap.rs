// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Composition Root
//
// Explicit constructor injection of every collaborator: repositories, bus,
// tool registry, model provider, and the services built on them. Two
// assemblies exist (in-memory for development and tests, Postgres plus
// JetStream for production) so no component ever reaches for a process
// singleton.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::agent_runtime::RuntimeConfig;
use crate::application::idempotency::IdempotencyService;
use crate::application::token::TokenService;
use crate::application::trade::{TradeService, TradeSettlementSubscriber};
use crate::application::worker::{AgentWorker, TaskDispatcher};
use crate::config::Settings;
use crate::domain::agent::{Agent, AgentModelConfig, AgentType};
use crate::domain::llm::LLMProvider;
use crate::domain::repository::{
    AgentRepository, AuditLogRepository, ExecutionRepository, IdempotencyRepository,
    MarketRepository, RevocationRepository, SessionRepository, TaskRepository,
    ToolCallRepository, UserRepository,
};
use crate::infrastructure::bus::{BusError, ConsumerOptions, InMemoryBus, MessageBus};
use crate::infrastructure::db::Database;
use crate::infrastructure::llm::provider_from_settings;
use crate::infrastructure::nats::JetStreamBus;
use crate::infrastructure::repositories::memory;
use crate::infrastructure::repositories::{
    postgres_agent::PostgresAgentRepository,
    postgres_auth::{
        PostgresAuditLogRepository, PostgresRevocationRepository, PostgresSessionRepository,
        PostgresUserRepository,
    },
    postgres_execution::{
        PostgresExecutionRepository, PostgresTaskRepository, PostgresToolCallRepository,
    },
    postgres_idempotency::PostgresIdempotencyRepository,
    postgres_market::PostgresMarketRepository,
};
use crate::infrastructure::tool_registry::{builtin_registry, ToolRegistry};

pub struct AppContext {
    pub settings: Settings,
    pub bus: Arc<dyn MessageBus>,
    pub agents: Arc<dyn AgentRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub tool_calls: Arc<dyn ToolCallRepository>,
    pub market: Arc<dyn MarketRepository>,
    pub registry: Arc<ToolRegistry>,
    pub llm: Arc<dyn LLMProvider>,
    pub idempotency: Arc<IdempotencyService>,
    pub tokens: Arc<TokenService>,
    pub trades: Arc<TradeService>,
    pub dispatcher: Arc<TaskDispatcher>,
}

impl AppContext {
    /// Assembly over in-memory infrastructure. Used by tests and local
    /// development without Postgres/NATS.
    pub fn in_memory(settings: Settings) -> Self {
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
        let agents: Arc<dyn AgentRepository> = Arc::new(memory::InMemoryAgentRepository::new());
        let tasks: Arc<dyn TaskRepository> = Arc::new(memory::InMemoryTaskRepository::new());
        let executions: Arc<dyn ExecutionRepository> =
            Arc::new(memory::InMemoryExecutionRepository::new());
        let tool_calls: Arc<dyn ToolCallRepository> =
            Arc::new(memory::InMemoryToolCallRepository::new());
        let market: Arc<dyn MarketRepository> = Arc::new(memory::InMemoryMarketRepository::new());
        let idempotency_repo: Arc<dyn IdempotencyRepository> =
            Arc::new(memory::InMemoryIdempotencyRepository::new());
        let users: Arc<dyn UserRepository> = Arc::new(memory::InMemoryUserRepository::new());
        let sessions: Arc<dyn SessionRepository> =
            Arc::new(memory::InMemorySessionRepository::new());
        let revocations: Arc<dyn RevocationRepository> =
            Arc::new(memory::InMemoryRevocationRepository::new());
        let audit: Arc<dyn AuditLogRepository> = Arc::new(memory::InMemoryAuditLogRepository::new());

        Self::assemble(
            settings,
            bus,
            agents,
            tasks,
            executions,
            tool_calls,
            market,
            idempotency_repo,
            users,
            sessions,
            revocations,
            audit,
        )
    }

    /// Production assembly: Postgres repositories over one pool, JetStream
    /// transport.
    pub async fn connect(settings: Settings) -> anyhow::Result<Self> {
        let database = Database::new(&settings.database_url).await?;
        let pool = database.get_pool().clone();

        let bus: Arc<dyn MessageBus> = Arc::new(
            JetStreamBus::connect(&settings.bus.nats_url, &settings.bus.stream_name).await?,
        );

        let agents: Arc<dyn AgentRepository> = Arc::new(PostgresAgentRepository::new(pool.clone()));
        let tasks: Arc<dyn TaskRepository> = Arc::new(PostgresTaskRepository::new(pool.clone()));
        let executions: Arc<dyn ExecutionRepository> =
            Arc::new(PostgresExecutionRepository::new(pool.clone()));
        let tool_calls: Arc<dyn ToolCallRepository> =
            Arc::new(PostgresToolCallRepository::new(pool.clone()));
        let market: Arc<dyn MarketRepository> = Arc::new(PostgresMarketRepository::new(pool.clone()));
        let idempotency_repo: Arc<dyn IdempotencyRepository> =
            Arc::new(PostgresIdempotencyRepository::new(pool.clone()));
        let users: Arc<dyn UserRepository> = Arc::new(PostgresUserRepository::new(pool.clone()));
        let sessions: Arc<dyn SessionRepository> =
            Arc::new(PostgresSessionRepository::new(pool.clone()));
        let revocations: Arc<dyn RevocationRepository> =
            Arc::new(PostgresRevocationRepository::new(pool.clone()));
        let audit: Arc<dyn AuditLogRepository> = Arc::new(PostgresAuditLogRepository::new(pool));

        Ok(Self::assemble(
            settings,
            bus,
            agents,
            tasks,
            executions,
            tool_calls,
            market,
            idempotency_repo,
            users,
            sessions,
            revocations,
            audit,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        settings: Settings,
        bus: Arc<dyn MessageBus>,
        agents: Arc<dyn AgentRepository>,
        tasks: Arc<dyn TaskRepository>,
        executions: Arc<dyn ExecutionRepository>,
        tool_calls: Arc<dyn ToolCallRepository>,
        market: Arc<dyn MarketRepository>,
        idempotency_repo: Arc<dyn IdempotencyRepository>,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        revocations: Arc<dyn RevocationRepository>,
        audit: Arc<dyn AuditLogRepository>,
    ) -> Self {
        let registry = Arc::new(builtin_registry(market.clone()));
        let llm = provider_from_settings(&settings);

        let idempotency = Arc::new(IdempotencyService::new(idempotency_repo));
        let tokens = Arc::new(TokenService::new(
            settings.auth.clone(),
            users,
            sessions,
            revocations,
            audit,
        ));
        let trades = Arc::new(TradeService::new(market.clone(), bus.clone()));
        let dispatcher = Arc::new(TaskDispatcher::new(
            bus.clone(),
            agents.clone(),
            tasks.clone(),
            executions.clone(),
        ));

        Self {
            settings,
            bus,
            agents,
            tasks,
            executions,
            tool_calls,
            market,
            registry,
            llm,
            idempotency,
            tokens,
            trades,
            dispatcher,
        }
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            max_retries: self.settings.agents.max_retries,
            retry_delay: self.settings.agents.retry_delay,
            timeout: self.settings.agents.timeout,
        }
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            max_in_flight: self.settings.worker.max_in_flight,
            idle_heartbeat: self.settings.worker.idle_heartbeat,
        }
    }
}

/// Background consumers started by `initialize_agent_system`.
pub struct AgentSystemHandles {
    pub worker: JoinHandle<Result<(), BusError>>,
    pub settlement: JoinHandle<Result<(), BusError>>,
}

/// Boot the runtime: synchronize the default agent definitions, then start
/// the task worker and the trade settlement subscriber.
pub async fn initialize_agent_system(ctx: &AppContext) -> anyhow::Result<AgentSystemHandles> {
    seed_default_agents(ctx.agents.as_ref(), &ctx.settings).await?;

    let worker = AgentWorker::new(
        ctx.bus.clone(),
        ctx.agents.clone(),
        ctx.tasks.clone(),
        ctx.executions.clone(),
        ctx.tool_calls.clone(),
        ctx.registry.clone(),
        ctx.llm.clone(),
        ctx.runtime_config(),
        ctx.consumer_options(),
    );
    let worker_handle = tokio::spawn(async move { worker.run().await });

    let settlement = TradeSettlementSubscriber::new(
        ctx.trades.clone(),
        ctx.bus.clone(),
        ctx.consumer_options(),
    );
    let settlement_handle = tokio::spawn(async move { settlement.run().await });

    info!("agent system ready");
    Ok(AgentSystemHandles {
        worker: worker_handle,
        settlement: settlement_handle,
    })
}

/// Create the default agent of each type when missing. Idempotent across
/// restarts; existing definitions are left untouched.
pub async fn seed_default_agents(
    agents: &dyn AgentRepository,
    settings: &Settings,
) -> anyhow::Result<()> {
    let defaults = [
        (
            AgentType::Market,
            "Market Intelligence Agent",
            "Analyzes marketplace trends and optimizes listings",
            "You are an expert marketplace analyst. Analyze market data, provide pricing recommendations, and optimize product listings.",
        ),
        (
            AgentType::Analytics,
            "Analytics & Reporting Agent",
            "Generates insights and analytics reports",
            "You are a data analyst. Create comprehensive reports, identify patterns, and provide actionable insights.",
        ),
        (
            AgentType::Content,
            "Content Generation Agent",
            "Creates and curates marketing content",
            "You are a content strategist. Generate compelling marketing copy, social posts, and product descriptions.",
        ),
        (
            AgentType::Scheduler,
            "Task Scheduler Agent",
            "Manages scheduled tasks and automation",
            "You are a task coordinator. Schedule operations, manage workflows, and automate repetitive tasks.",
        ),
        (
            AgentType::Admin,
            "System Administrator Agent",
            "Monitors system health and performs maintenance",
            "You are a system administrator. Monitor infrastructure, manage resources, and handle maintenance operations.",
        ),
    ];

    for (agent_type, name, description, system_prompt) in defaults {
        if agents.find_active_by_type(agent_type).await?.is_some() {
            continue;
        }
        let agent = Agent::new(
            name,
            agent_type,
            description,
            system_prompt,
            AgentModelConfig {
                model: settings.agents.model.clone(),
                temperature: settings.agents.temperature,
                max_tokens: settings.agents.max_tokens,
            },
        );
        agents.save(&agent).await?;
        info!(agent_type = agent_type.as_str(), "seeded agent definition");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let ctx = AppContext::in_memory(Settings::default());

        seed_default_agents(ctx.agents.as_ref(), &ctx.settings).await.unwrap();
        seed_default_agents(ctx.agents.as_ref(), &ctx.settings).await.unwrap();

        let all = ctx.agents.list_all().await.unwrap();
        assert_eq!(all.len(), AgentType::ALL.len());
    }
}
