// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! AGORA runtime daemon
//!
//! Boots the production assembly (Postgres + NATS JetStream), seeds the
//! default agents, starts the task worker and the trade settlement
//! subscriber, and serves the HTTP surface until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use agora_core::application::bootstrap::{initialize_agent_system, AppContext};
use agora_core::config::Settings;
use agora_core::presentation::api;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = Settings::from_env().context("Failed to load configuration")?;
    let http_addr = settings.http_addr.clone();

    let ctx = Arc::new(
        AppContext::connect(settings)
            .await
            .context("Failed to connect infrastructure")?,
    );

    let handles = initialize_agent_system(&ctx)
        .await
        .context("Failed to start agent system")?;

    let app = api::app(ctx);
    let listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", http_addr))?;
    info!(addr = %http_addr, "agentd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("agentd shutting down");
    handles.worker.abort();
    handles.settlement.abort();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
