// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_runtime;
pub mod agents;
pub mod bootstrap;
pub mod idempotency;
pub mod token;
pub mod trade;
pub mod worker;
