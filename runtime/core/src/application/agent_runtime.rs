// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Agent Execution Harness
//
// Runs the behavior hook pipeline for one agent: preprocess, execute with
// retry and per-attempt timeout, postprocess, success/error hooks. Exactly
// one AgentExecution row is written per `execute` call; retries are
// attempts inside that record. Collaborators are constructor-injected so
// tests can run against in-memory infrastructure.

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::domain::agent::{Agent, AgentId, AgentType};
use crate::domain::events::ExecutionEvent;
use crate::domain::execution::{AgentExecution, ExecutionContext, ExecutionId, ExecutionResult};
use crate::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider};
use crate::domain::repository::{ExecutionRepository, RepositoryError, ToolCallRepository};
use crate::domain::tool::{ToolCall, ToolError};
use crate::infrastructure::bus::MessageBus;
use crate::infrastructure::tool_registry::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Idle,
    Running,
    Paused,
    Shutdown,
}

/// Retry/timeout knobs for one harness instance.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Execution timeout")]
    Timeout,

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Llm(#[from] LLMError),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<RepositoryError> for AgentError {
    fn from(err: RepositoryError) -> Self {
        AgentError::Storage(err.to_string())
    }
}

/// Per-execution facilities handed to `on_execute`: tool invocation through
/// the registry (with ToolCall audit rows) and model access with the
/// agent's configured prompt and parameters.
pub struct AgentServices {
    agent_id: AgentId,
    execution_id: ExecutionId,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    registry: Arc<ToolRegistry>,
    tool_calls: Arc<dyn ToolCallRepository>,
    llm: Arc<dyn LLMProvider>,
}

impl AgentServices {
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Look up a tool, validate arguments, and execute it with a ToolCall
    /// audit row around the invocation. A tool failure propagates to the
    /// caller; the behavior decides whether that aborts the execution.
    pub async fn call_tool(
        &self,
        name: &str,
        args: Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, AgentError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tool.validate(&args)?;

        let mut call = ToolCall::start(
            self.agent_id,
            self.execution_id,
            name,
            tool.version(),
            args.clone(),
        );
        self.tool_calls.save(&call).await?;

        let started = Instant::now();
        match tool.execute(args, ctx).await {
            Ok(result) => {
                call.succeed(result.clone(), started.elapsed().as_millis() as u64);
                self.tool_calls.save(&call).await?;
                Ok(result)
            }
            Err(e) => {
                call.fail(e.to_string(), started.elapsed().as_millis() as u64);
                if let Err(save_err) = self.tool_calls.save(&call).await {
                    warn!(tool = name, error = %save_err, "failed to record tool call failure");
                }
                Err(e.into())
            }
        }
    }

    /// Generate a completion with the agent's system prompt and model
    /// parameters.
    pub async fn call_ai(&self, prompt: &str) -> Result<GenerationResponse, AgentError> {
        let options = GenerationOptions {
            system_prompt: Some(self.system_prompt.clone()),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            stop_sequences: None,
        };
        Ok(self.llm.generate(prompt, &options).await?)
    }
}

/// Behavior hooks implemented per agent type. Defaults are no-ops where
/// the pipeline allows it.
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    fn agent_type(&self) -> AgentType;

    async fn on_initialize(&self) -> Result<(), AgentError> {
        Ok(())
    }

    /// Validate/transform input. Failures here abort before the retry loop.
    async fn on_preprocess(&self, input: Value) -> Result<Value, AgentError>;

    /// The retried stage. Must be safe to run more than once.
    async fn on_execute(
        &self,
        input: &Value,
        ctx: &ExecutionContext,
        services: &AgentServices,
    ) -> Result<ExecutionResult, AgentError>;

    async fn on_postprocess(
        &self,
        result: ExecutionResult,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, AgentError> {
        Ok(result)
    }

    async fn on_success(&self, _result: &ExecutionResult, _ctx: &ExecutionContext) {}

    async fn on_error(&self, _error: &AgentError, _ctx: &ExecutionContext) {}

    async fn on_shutdown(&self) {}
}

pub struct AgentRuntime {
    agent: Agent,
    behavior: Arc<dyn AgentBehavior>,
    config: RuntimeConfig,
    executions: Arc<dyn ExecutionRepository>,
    tool_calls: Arc<dyn ToolCallRepository>,
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LLMProvider>,
    bus: Arc<dyn MessageBus>,
    status: Mutex<RuntimeStatus>,
}

impl AgentRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: Agent,
        behavior: Arc<dyn AgentBehavior>,
        config: RuntimeConfig,
        executions: Arc<dyn ExecutionRepository>,
        tool_calls: Arc<dyn ToolCallRepository>,
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LLMProvider>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            agent,
            behavior,
            config,
            executions,
            tool_calls,
            registry,
            llm,
            bus,
            status: Mutex::new(RuntimeStatus::Idle),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn status(&self) -> RuntimeStatus {
        *self.status.lock().expect("status lock poisoned")
    }

    fn set_status(&self, status: RuntimeStatus) {
        *self.status.lock().expect("status lock poisoned") = status;
    }

    pub async fn initialize(&self) -> Result<(), AgentError> {
        self.behavior.on_initialize().await?;
        self.set_status(RuntimeStatus::Idle);
        Ok(())
    }

    /// Administrative stop: no new executions are dispatched to a paused
    /// harness. In-flight work is unaffected.
    pub fn pause(&self) {
        self.set_status(RuntimeStatus::Paused);
    }

    pub async fn shutdown(&self) {
        self.behavior.on_shutdown().await;
        self.set_status(RuntimeStatus::Shutdown);
    }

    /// Run the full pipeline for one input. The AgentExecution row is
    /// persisted RUNNING before any hook fires and always reaches a
    /// terminal state; the harness returns to Idle on every path.
    pub async fn execute(
        &self,
        input: Value,
        ctx: ExecutionContext,
    ) -> Result<ExecutionResult, AgentError> {
        self.set_status(RuntimeStatus::Running);
        let outcome = self.run(input, ctx).await;
        self.set_status(RuntimeStatus::Idle);
        outcome
    }

    async fn run(
        &self,
        input: Value,
        mut ctx: ExecutionContext,
    ) -> Result<ExecutionResult, AgentError> {
        let started = Instant::now();

        let mut execution = AgentExecution::start(
            self.agent.id,
            ctx.task_id,
            input.clone(),
            serde_json::to_value(&ctx.metadata).unwrap_or(Value::Null),
            self.agent.system_prompt.clone(),
            self.agent.model_config.model.clone(),
        );
        // Resume the row the producer minted at enqueue time, if any.
        if let Some(id) = ctx.execution_id {
            execution.id = id;
        }
        self.executions.save(&execution).await?;

        let services = AgentServices {
            agent_id: self.agent.id,
            execution_id: execution.id,
            system_prompt: self.agent.system_prompt.clone(),
            temperature: self.agent.model_config.temperature,
            max_tokens: self.agent.model_config.max_tokens,
            registry: self.registry.clone(),
            tool_calls: self.tool_calls.clone(),
            llm: self.llm.clone(),
        };

        let outcome = async {
            let processed = self.behavior.on_preprocess(input).await?;
            let result = self
                .execute_with_retry(&processed, &mut ctx, &services)
                .await?;
            self.behavior.on_postprocess(result, &ctx).await
        }
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let agent_type = self.agent.agent_type.as_str();

        match outcome {
            Ok(result) => {
                execution.succeed(&result, duration_ms);
                self.executions.save(&execution).await?;
                self.behavior.on_success(&result, &ctx).await;

                counter!("agora_agent_executions_total", "agent_type" => agent_type, "status" => "success")
                    .increment(1);
                histogram!("agora_agent_execution_duration_ms", "agent_type" => agent_type)
                    .record(duration_ms as f64);

                self.publish_event(ExecutionEvent::ExecutionSucceeded {
                    agent_id: self.agent.id,
                    execution_id: execution.id,
                    duration_ms,
                    at: chrono::Utc::now(),
                })
                .await;

                Ok(result)
            }
            Err(e) => {
                self.behavior.on_error(&e, &ctx).await;

                execution.fail(e.to_string(), duration_ms);
                if let Err(save_err) = self.executions.save(&execution).await {
                    error!(execution_id = %execution.id, error = %save_err, "failed to record execution failure");
                }

                counter!("agora_agent_executions_total", "agent_type" => agent_type, "status" => "failure")
                    .increment(1);

                self.publish_event(ExecutionEvent::ExecutionFailed {
                    agent_id: self.agent.id,
                    execution_id: execution.id,
                    error: e.to_string(),
                    duration_ms,
                    at: chrono::Utc::now(),
                })
                .await;

                Err(e)
            }
        }
    }

    /// Up to `max_retries` attempts of `on_execute`, each raced against the
    /// configured timeout, with exponential backoff between attempts. The
    /// last error is rethrown when every attempt fails.
    async fn execute_with_retry(
        &self,
        input: &Value,
        ctx: &mut ExecutionContext,
        services: &AgentServices,
    ) -> Result<ExecutionResult, AgentError> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_retries {
            let mut attempt_ctx = ctx.clone();
            attempt_ctx.attempt_number = attempt;
            // Child token per attempt: a timeout cancels this attempt's
            // in-flight work without poisoning later attempts.
            attempt_ctx.cancellation = ctx.cancellation.child_token();
            ctx.attempt_number = attempt;

            match tokio::time::timeout(
                self.config.timeout,
                self.behavior.on_execute(input, &attempt_ctx, services),
            )
            .await
            {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    warn!(
                        agent_id = %self.agent.id,
                        attempt,
                        error = %e,
                        "execution attempt failed"
                    );
                    last_error = Some(e);
                }
                Err(_) => {
                    attempt_ctx.cancellation.cancel();
                    warn!(agent_id = %self.agent.id, attempt, "execution attempt timed out");
                    last_error = Some(AgentError::Timeout);
                }
            }

            if attempt < self.config.max_retries {
                let delay = self.config.retry_delay * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| AgentError::Execution("execution failed after retries".to_string())))
    }

    async fn publish_event(&self, event: ExecutionEvent) {
        let payload = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode execution event");
                return;
            }
        };
        if let Err(e) = self.bus.publish(event.subject(), payload.into()).await {
            warn!(subject = event.subject(), error = %e, "failed to publish execution event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentModelConfig;
    use crate::domain::execution::{ExecutionStatus, TokenUsage};
    use crate::infrastructure::bus::InMemoryBus;
    use crate::infrastructure::llm::StaticProvider;
    use crate::infrastructure::repositories::memory::{
        InMemoryExecutionRepository, InMemoryMarketRepository, InMemoryToolCallRepository,
    };
    use crate::infrastructure::tool_registry::builtin_registry;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyBehavior {
        attempts: AtomicU32,
        succeed_on: Option<u32>,
        attempt_times: Mutex<Vec<Instant>>,
    }

    impl FlakyBehavior {
        fn new(succeed_on: Option<u32>) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                succeed_on,
                attempt_times: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AgentBehavior for FlakyBehavior {
        fn agent_type(&self) -> AgentType {
            AgentType::Market
        }

        async fn on_preprocess(&self, input: Value) -> Result<Value, AgentError> {
            if input.get("action").is_none() {
                return Err(AgentError::Validation("action not specified".to_string()));
            }
            Ok(input)
        }

        async fn on_execute(
            &self,
            _input: &Value,
            _ctx: &ExecutionContext,
            _services: &AgentServices,
        ) -> Result<ExecutionResult, AgentError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            self.attempt_times.lock().unwrap().push(Instant::now());
            match self.succeed_on {
                Some(k) if attempt >= k => Ok(ExecutionResult {
                    output: serde_json::json!({"attempt": attempt}),
                    reasoning: None,
                    token_usage: TokenUsage::new(10, 5),
                    cost_usd: 0.001,
                    duration_ms: 1,
                }),
                _ => Err(AgentError::Execution(format!("attempt {} boom", attempt))),
            }
        }
    }

    fn runtime_with(behavior: Arc<dyn AgentBehavior>, config: RuntimeConfig) -> (AgentRuntime, Arc<InMemoryExecutionRepository>) {
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let agent = Agent::new(
            "Market Intelligence Agent",
            AgentType::Market,
            "Analyzes marketplace trends",
            "You are an expert marketplace analyst.",
            AgentModelConfig::default(),
        );
        let runtime = AgentRuntime::new(
            agent,
            behavior,
            config,
            executions.clone(),
            Arc::new(InMemoryToolCallRepository::new()),
            Arc::new(builtin_registry(Arc::new(InMemoryMarketRepository::new()))),
            Arc::new(StaticProvider::default()),
            Arc::new(InMemoryBus::new()),
        );
        (runtime, executions)
    }

    fn test_config() -> RuntimeConfig {
        RuntimeConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_execute_attempts_max_retries_with_backoff() {
        let behavior = Arc::new(FlakyBehavior::new(None));
        let (runtime, executions) = runtime_with(behavior.clone(), test_config());

        let ctx = ExecutionContext::new(runtime.agent().id);
        let err = runtime
            .execute(serde_json::json!({"action": "analyze_market"}), ctx)
            .await
            .unwrap_err();

        assert_eq!(behavior.attempts.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("attempt 3 boom"));

        // Strictly increasing inter-attempt delay (10ms then 20ms).
        let times = behavior.attempt_times.lock().unwrap();
        let gap1 = times[1] - times[0];
        let gap2 = times[2] - times[1];
        assert!(gap2 > gap1, "expected exponential backoff, got {:?} then {:?}", gap1, gap2);

        let rows = executions.find_by_agent(runtime.agent().id).await.unwrap();
        assert_eq!(rows.len(), 1, "retries must not create new execution rows");
        assert_eq!(rows[0].status, ExecutionStatus::Failure);
        assert!(rows[0].error.as_deref().unwrap().contains("attempt 3 boom"));
        assert_eq!(runtime.status(), RuntimeStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_second_attempt_records_success() {
        let behavior = Arc::new(FlakyBehavior::new(Some(2)));
        let (runtime, executions) = runtime_with(behavior.clone(), test_config());

        let ctx = ExecutionContext::new(runtime.agent().id);
        let result = runtime
            .execute(serde_json::json!({"action": "analyze_market"}), ctx)
            .await
            .unwrap();

        assert_eq!(behavior.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(result.output["attempt"], 2);

        let rows = executions.find_by_agent(runtime.agent().id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ExecutionStatus::Success);
        assert_eq!(rows[0].token_usage.total, 15);
    }

    #[tokio::test]
    async fn test_preprocess_failure_skips_retry_loop() {
        let behavior = Arc::new(FlakyBehavior::new(Some(1)));
        let (runtime, executions) = runtime_with(behavior.clone(), test_config());

        let ctx = ExecutionContext::new(runtime.agent().id);
        let err = runtime.execute(serde_json::json!({}), ctx).await.unwrap_err();

        assert!(matches!(err, AgentError::Validation(_)));
        assert_eq!(behavior.attempts.load(Ordering::SeqCst), 0);

        let rows = executions.find_by_agent(runtime.agent().id).await.unwrap();
        assert_eq!(rows[0].status, ExecutionStatus::Failure);
    }

    struct HangingBehavior;

    #[async_trait]
    impl AgentBehavior for HangingBehavior {
        fn agent_type(&self) -> AgentType {
            AgentType::Market
        }

        async fn on_preprocess(&self, input: Value) -> Result<Value, AgentError> {
            Ok(input)
        }

        async fn on_execute(
            &self,
            _input: &Value,
            ctx: &ExecutionContext,
            _services: &AgentServices,
        ) -> Result<ExecutionResult, AgentError> {
            // Cooperative: stop as soon as the attempt is cancelled.
            ctx.cancellation.cancelled().await;
            Err(AgentError::Execution("cancelled".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_surfaces_after_exhausting_attempts() {
        let (runtime, _) = runtime_with(
            Arc::new(HangingBehavior),
            RuntimeConfig {
                max_retries: 2,
                retry_delay: Duration::from_millis(5),
                timeout: Duration::from_millis(20),
            },
        );

        let ctx = ExecutionContext::new(runtime.agent().id);
        let err = runtime
            .execute(serde_json::json!({"action": "x"}), ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout));
        assert_eq!(runtime.status(), RuntimeStatus::Idle);
    }
}
