// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # AGORA Runtime Core
//!
//! Autonomous-agent task runtime for the AGORA marketplace platform:
//! typed agents executed through a bounded-capability tool interface, fed
//! by a durable task queue, with idempotency-guarded financial operations
//! and token-based auth gating who may enqueue work.
//!
//! # Architecture
//!
//! - **domain**: entities, state machines, repository interfaces, events
//! - **application**: agent harness, worker, idempotency/token/trade services
//! - **infrastructure**: Postgres + in-memory repositories, bus, tools, LLM adapters
//! - **presentation**: axum HTTP surface and auth middleware

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
