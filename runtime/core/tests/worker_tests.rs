// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Worker behavior over the in-memory bus: dispatched tasks reach a
// terminal state, agent counters move, and the execution row minted at
// enqueue time is the one the harness completes.

use agora_core::application::bootstrap::{initialize_agent_system, AppContext};
use agora_core::config::Settings;
use agora_core::domain::agent::AgentType;
use agora_core::domain::execution::ExecutionStatus;
use agora_core::domain::task::TaskStatus;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn test_settings() -> Settings {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let mut settings = Settings::default();
    settings.auth.jwt_secret = "worker-test-secret".to_string();
    // Keep retries fast so the failure path converges quickly.
    settings.agents.max_retries = 2;
    settings.agents.retry_delay = Duration::from_millis(5);
    settings.agents.timeout = Duration::from_millis(500);
    settings
}

async fn wait_for<F, Fut>(mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_dispatched_task_completes_and_updates_agent_counters() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let handles = initialize_agent_system(&ctx).await.unwrap();

    let message = ctx
        .dispatcher
        .dispatch(
            AgentType::Market,
            "analyze_market",
            json!({ "action": "analyze_market", "category": "artwork" }),
        )
        .await
        .unwrap();

    let completed = wait_for(|| async {
        ctx.tasks
            .find_by_id(message.task_id)
            .await
            .unwrap()
            .is_some_and(|t| t.status == TaskStatus::Completed)
    })
    .await;
    assert!(completed, "task never completed");

    // The worker resumed the execution row minted at enqueue time.
    let execution = ctx
        .executions
        .find_by_id(message.execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert!(execution.output.is_some());

    let agent = ctx.agents.find_by_id(message.agent_id).await.unwrap().unwrap();
    assert_eq!(agent.total_executions, 1);
    assert_eq!(agent.success_count, 1);
    assert_eq!(agent.failure_count, 0);
    assert!(agent.last_executed_at.is_some());

    // Tool calls were audited against this execution.
    let calls = ctx
        .tool_calls
        .find_by_execution(message.execution_id)
        .await
        .unwrap();
    assert!(!calls.is_empty(), "market agent should have invoked tools");

    handles.worker.abort();
    handles.settlement.abort();
}

#[tokio::test]
async fn test_failing_task_reaches_failed_state_and_counts_failure() {
    let ctx = Arc::new(AppContext::in_memory(test_settings()));
    let handles = initialize_agent_system(&ctx).await.unwrap();

    let message = ctx
        .dispatcher
        .dispatch(
            AgentType::Market,
            "liquidate_everything",
            json!({ "action": "liquidate_everything" }),
        )
        .await
        .unwrap();

    let failed = wait_for(|| async {
        ctx.tasks
            .find_by_id(message.task_id)
            .await
            .unwrap()
            .is_some_and(|t| t.status == TaskStatus::Failed)
    })
    .await;
    assert!(failed, "task never reached FAILED");

    let execution = ctx
        .executions
        .find_by_id(message.execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failure);
    assert!(execution
        .error
        .as_deref()
        .unwrap()
        .contains("Unknown market action"));

    let agent_failed = wait_for(|| async {
        ctx.agents
            .find_by_id(message.agent_id)
            .await
            .unwrap()
            .is_some_and(|a| a.failure_count >= 1)
    })
    .await;
    assert!(agent_failed, "failure counter never moved");

    // The worker nacks on failure, so the bus redelivers; abort before the
    // redelivery loop churns further.
    handles.worker.abort();
    handles.settlement.abort();
}
