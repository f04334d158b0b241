// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod bus;
pub mod db;
pub mod llm;
pub mod nats;
pub mod repositories;
pub mod tool_registry;
