// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Agent Task Worker
//
// Durable consumer of `agent.tasks`: decodes the task envelope, runs the
// harness for the addressed agent type, and applies task/agent state
// mutations before acknowledging. Failures are nacked for bus-level
// redelivery, so delivery is at-least-once; exactly-once business effects
// are owned by the idempotency and trade state-machine guards downstream.

use metrics::{counter, histogram};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::application::agent_runtime::{AgentRuntime, RuntimeConfig};
use crate::application::agents::behavior_for;
use crate::domain::agent::Agent;
use crate::domain::events::{subjects, TaskEvent};
use crate::domain::execution::ExecutionContext;
use crate::domain::llm::LLMProvider;
use crate::domain::repository::{
    AgentRepository, ExecutionRepository, TaskRepository, ToolCallRepository,
};
use crate::domain::task::{AgentTask, AgentTaskMessage};
use crate::infrastructure::bus::{BusError, ConsumerOptions, Delivery, MessageBus};
use crate::infrastructure::tool_registry::ToolRegistry;

pub const TASK_CONSUMER_GROUP: &str = "agent-worker";

pub struct AgentWorker {
    bus: Arc<dyn MessageBus>,
    agents: Arc<dyn AgentRepository>,
    tasks: Arc<dyn TaskRepository>,
    executions: Arc<dyn ExecutionRepository>,
    tool_calls: Arc<dyn ToolCallRepository>,
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LLMProvider>,
    runtime_config: RuntimeConfig,
    consumer_options: ConsumerOptions,
}

impl AgentWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: Arc<dyn MessageBus>,
        agents: Arc<dyn AgentRepository>,
        tasks: Arc<dyn TaskRepository>,
        executions: Arc<dyn ExecutionRepository>,
        tool_calls: Arc<dyn ToolCallRepository>,
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LLMProvider>,
        runtime_config: RuntimeConfig,
        consumer_options: ConsumerOptions,
    ) -> Self {
        Self {
            bus,
            agents,
            tasks,
            executions,
            tool_calls,
            registry,
            llm,
            runtime_config,
            consumer_options,
        }
    }

    /// Subscribe the durable group and process deliveries until the bus
    /// closes. Per-message errors never stop the loop.
    pub async fn run(&self) -> Result<(), BusError> {
        let mut subscription = self
            .bus
            .subscribe(
                subjects::AGENT_TASKS,
                TASK_CONSUMER_GROUP,
                self.consumer_options.clone(),
            )
            .await?;

        info!(group = TASK_CONSUMER_GROUP, "agent worker listening for tasks");

        loop {
            let delivery = match subscription.next().await {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(error = %e, "task subscription failed");
                    return Err(e);
                }
            };
            self.handle_delivery(delivery).await;
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let message: AgentTaskMessage = match serde_json::from_slice(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                // Undecodable envelopes would redeliver forever; drop them
                // with a trace instead.
                error!(error = %e, "undecodable task envelope, dropping");
                if let Err(ack_err) = delivery.ack().await {
                    warn!(error = %ack_err, "failed to ack poison message");
                }
                return;
            }
        };

        let started = Instant::now();
        let attempt = delivery.attempt;
        info!(
            task_id = %message.task_id,
            action = %message.action,
            attempt,
            "processing task"
        );

        match self.process(&message).await {
            Ok(()) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                counter!("agora_worker_tasks_total", "status" => "completed").increment(1);
                histogram!("agora_worker_task_duration_ms").record(duration_ms as f64);
                info!(task_id = %message.task_id, duration_ms, "task completed");

                if let Err(e) = delivery.ack().await {
                    // Crash window: mutations are applied but the ack was
                    // lost, so the bus will redeliver. Downstream guards
                    // keep the redelivery harmless.
                    warn!(task_id = %message.task_id, error = %e, "ack failed after completion");
                }
            }
            Err(e) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                counter!("agora_worker_tasks_total", "status" => "failed").increment(1);
                error!(task_id = %message.task_id, error = %e, "task failed");

                self.apply_failure_state(&message, &e, duration_ms).await;

                if let Err(nack_err) = delivery.nack().await {
                    warn!(task_id = %message.task_id, error = %nack_err, "nack failed");
                }
            }
        }
    }

    async fn process(&self, message: &AgentTaskMessage) -> Result<(), String> {
        let agent = self
            .agents
            .find_by_id(message.agent_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("agent not found: {}", message.agent_id))?;

        if let Ok(Some(mut task)) = self.tasks.find_by_id(message.task_id).await {
            task.start();
            if let Err(e) = self.tasks.save(&task).await {
                warn!(task_id = %message.task_id, error = %e, "failed to mark task running");
            }
        }

        // A fresh harness per delivery keeps executions isolated across the
        // concurrent in-flight slots.
        let runtime = AgentRuntime::new(
            agent.clone(),
            behavior_for(message.agent_type),
            self.runtime_config.clone(),
            self.executions.clone(),
            self.tool_calls.clone(),
            self.registry.clone(),
            self.llm.clone(),
            self.bus.clone(),
        );

        let ctx = ExecutionContext::new(agent.id)
            .with_task(message.task_id)
            .with_execution(message.execution_id);

        let started = Instant::now();
        let result = runtime
            .execute(message.input.clone(), ctx)
            .await
            .map_err(|e| e.to_string())?;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.apply_success_state(message, &agent, result.output.clone(), duration_ms)
            .await;
        Ok(())
    }

    async fn apply_success_state(
        &self,
        message: &AgentTaskMessage,
        agent: &Agent,
        output: Value,
        duration_ms: u64,
    ) {
        match self.tasks.find_by_id(message.task_id).await {
            Ok(Some(mut task)) => {
                task.complete(output, duration_ms);
                if let Err(e) = self.tasks.save(&task).await {
                    warn!(task_id = %message.task_id, error = %e, "failed to mark task completed");
                }
            }
            Ok(None) => warn!(task_id = %message.task_id, "task row missing on completion"),
            Err(e) => warn!(task_id = %message.task_id, error = %e, "failed to load task"),
        }

        self.record_agent_outcome(agent, true, duration_ms).await;

        self.publish_task_event(TaskEvent::TaskCompleted {
            execution_id: message.execution_id,
            task_id: message.task_id,
            duration_ms,
            at: chrono::Utc::now(),
        })
        .await;
    }

    /// Failure-path mutations are individually best-effort: one failing
    /// write must not prevent the others from being attempted.
    async fn apply_failure_state(&self, message: &AgentTaskMessage, error: &str, duration_ms: u64) {
        match self.executions.find_by_id(message.execution_id).await {
            Ok(Some(mut execution)) if execution.completed_at.is_none() => {
                execution.fail(error, duration_ms);
                if let Err(e) = self.executions.save(&execution).await {
                    warn!(execution_id = %message.execution_id, error = %e, "failed to mark execution failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(execution_id = %message.execution_id, error = %e, "failed to load execution"),
        }

        match self.tasks.find_by_id(message.task_id).await {
            Ok(Some(mut task)) => {
                task.fail(error);
                if let Err(e) = self.tasks.save(&task).await {
                    warn!(task_id = %message.task_id, error = %e, "failed to mark task failed");
                }
            }
            Ok(None) => warn!(task_id = %message.task_id, "task row missing on failure"),
            Err(e) => warn!(task_id = %message.task_id, error = %e, "failed to load task"),
        }

        match self.agents.find_by_id(message.agent_id).await {
            Ok(Some(agent)) => self.record_agent_outcome(&agent, false, duration_ms).await,
            Ok(None) => warn!(agent_id = %message.agent_id, "agent row missing on failure"),
            Err(e) => warn!(agent_id = %message.agent_id, error = %e, "failed to load agent"),
        }

        self.publish_task_event(TaskEvent::TaskFailed {
            execution_id: message.execution_id,
            task_id: message.task_id,
            error: error.to_string(),
            duration_ms,
            at: chrono::Utc::now(),
        })
        .await;
    }

    async fn record_agent_outcome(&self, agent: &Agent, success: bool, duration_ms: u64) {
        // Re-read before mutating so concurrent slots do not clobber each
        // other's counter updates.
        let mut current = match self.agents.find_by_id(agent.id).await {
            Ok(Some(current)) => current,
            _ => agent.clone(),
        };
        current.record_execution(success, duration_ms);
        if let Err(e) = self.agents.save(&current).await {
            warn!(agent_id = %agent.id, error = %e, "failed to update agent counters");
        }
    }

    async fn publish_task_event(&self, event: TaskEvent) {
        let payload = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode task event");
                return;
            }
        };
        if let Err(e) = self.bus.publish(event.subject(), payload.into()).await {
            warn!(subject = event.subject(), error = %e, "failed to publish task event");
        }
    }
}

/// Producer half of the queue: persist the task and its RUNNING execution
/// row, then publish the envelope the worker consumes.
pub struct TaskDispatcher {
    bus: Arc<dyn MessageBus>,
    agents: Arc<dyn AgentRepository>,
    tasks: Arc<dyn TaskRepository>,
    executions: Arc<dyn ExecutionRepository>,
}

impl TaskDispatcher {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        agents: Arc<dyn AgentRepository>,
        tasks: Arc<dyn TaskRepository>,
        executions: Arc<dyn ExecutionRepository>,
    ) -> Self {
        Self {
            bus,
            agents,
            tasks,
            executions,
        }
    }

    pub async fn dispatch(
        &self,
        agent_type: crate::domain::agent::AgentType,
        action: &str,
        input: Value,
    ) -> Result<AgentTaskMessage, String> {
        let agent = self
            .agents
            .find_active_by_type(agent_type)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("no active agent for type {}", agent_type.as_str()))?;

        let task = AgentTask::new(agent.id, action, input.clone());
        self.tasks.save(&task).await.map_err(|e| e.to_string())?;

        let execution = crate::domain::execution::AgentExecution::start(
            agent.id,
            Some(task.id),
            input.clone(),
            Value::Null,
            agent.system_prompt.clone(),
            agent.model_config.model.clone(),
        );
        self.executions
            .save(&execution)
            .await
            .map_err(|e| e.to_string())?;

        let message = AgentTaskMessage {
            execution_id: execution.id,
            task_id: task.id,
            agent_id: agent.id,
            agent_type,
            action: action.to_string(),
            input,
            timestamp: chrono::Utc::now(),
        };

        let payload = serde_json::to_vec(&message).map_err(|e| e.to_string())?;
        self.bus
            .publish(subjects::AGENT_TASKS, payload.into())
            .await
            .map_err(|e| e.to_string())?;

        Ok(message)
    }
}
