//! Access to the hosted text-generation model.
//!
//! Everything above this module talks to a [`TextGenerator`]; [`LlmClient`]
//! is the production implementation and tests substitute a scripted one.

pub mod client;
#[cfg(test)]
pub mod mock;

pub use client::LlmClient;

use crate::models::{ModelConfig, Role};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Api(#[from] async_openai::error::OpenAIError),
    #[error("LLM returned an empty response")]
    EmptyResponse,
    #[error("no API key configured")]
    NotConfigured,
}

/// One prior turn forwarded as conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Single prompt, single answer.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, LlmError>;

    /// Reply to the last turn of `history`, honouring the system prompt and
    /// sampling parameters of `config`.
    async fn chat(
        &self,
        model: &str,
        history: &[ChatTurn],
        config: Option<&ModelConfig>,
    ) -> Result<String, LlmError>;

    /// Model ids the credential can use.
    async fn list_models(&self) -> Result<Vec<String>, LlmError>;
}
