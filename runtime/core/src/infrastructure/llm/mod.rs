// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Adapters translating between the domain `LLMProvider` interface and
// external model APIs, plus a deterministic in-process provider used by
// development and tests.

pub mod gemini;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Settings;
use crate::domain::execution::TokenUsage;
use crate::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider};

/// Deterministic provider that echoes a canned completion and estimates
/// token usage by whitespace. Explicitly a fake: behavior is part of its
/// contract, nothing downstream may assume model quality from it.
pub struct StaticProvider {
    model: String,
    reply: String,
}

impl StaticProvider {
    pub fn new(model: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reply: reply.into(),
        }
    }
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self::new("static", "ok")
    }
}

#[async_trait]
impl LLMProvider for StaticProvider {
    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        let input = prompt.split_whitespace().count() as u32;
        let output = self.reply.split_whitespace().count() as u32;
        Ok(GenerationResponse {
            text: self.reply.clone(),
            usage: TokenUsage::new(input, output),
            model: self.model.clone(),
        })
    }
}

/// Select the provider for the configured model: the Gemini adapter when an
/// API key is configured, the static provider otherwise so the runtime
/// stays operable in development.
pub fn provider_from_settings(settings: &Settings) -> Arc<dyn LLMProvider> {
    match settings.agents.gemini_api_key.as_deref() {
        Some(key) if !key.is_empty() => Arc::new(gemini::GeminiAdapter::new(
            key.to_string(),
            settings.agents.model.clone(),
        )),
        _ => Arc::new(StaticProvider::new(settings.agents.model.clone(), "ok")),
    }
}
