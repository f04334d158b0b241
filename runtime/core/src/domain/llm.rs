// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Domain Interface (Anti-Corruption Layer)
//
// Defines the domain interface for model backends. Prevents vendor lock-in
// by abstracting external LLM APIs; implementations live in
// infrastructure/llm/.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::execution::TokenUsage;

/// Domain interface for LLM providers.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the model.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError>;
}

/// Options for LLM generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            temperature: Some(0.7),
            max_tokens: Some(2000),
            stop_sequences: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Generated text.
    pub text: String,

    /// Token usage stats.
    pub usage: TokenUsage,

    /// Model that produced the response (e.g. "gemini-2.0-flash").
    pub model: String,
}

/// Errors that can occur during LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),
}
