//! Chat turn records shared by the store, the context pipeline and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model ids offered when the provider's own listing is unavailable.
pub const GEMINI_MODELS: &[&str] = &[
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "gemini-1.5-pro-latest",
    "gemini-1.0-pro",
    "gemini-1.0-pro-latest",
    "gemini-1.0-pro-vision",
    "gemini-1.0-pro-vision-latest",
    "gemini-1.5-flash-latest",
];

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(anyhow::anyhow!("Unknown message role: {}", other)),
        }
    }
}

/// Derived context attached to a turn when it is stored. Never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub relevant_ids: Vec<i64>,
    #[serde(default = "default_importance")]
    pub importance: f64,
    #[serde(default)]
    pub topics: Vec<String>,
}

fn default_importance() -> f64 {
    1.0
}

impl MessageContext {
    /// Context carrying nothing but the ids of the most recent prior turns.
    pub fn minimal(relevant_ids: Vec<i64>) -> Self {
        Self {
            summary: String::new(),
            relevant_ids,
            importance: default_importance(),
            topics: Vec::new(),
        }
    }
}

impl Default for MessageContext {
    fn default() -> Self {
        Self::minimal(Vec::new())
    }
}

/// Generation parameters in effect for a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: Some(0.7),
            top_k: Some(40),
            top_p: Some(0.95),
            max_output_tokens: Some(1024),
        }
    }
}

impl ModelConfig {
    /// Fills every unset field from `defaults`.
    pub fn or_defaults(self, defaults: &ModelConfig) -> Self {
        Self {
            system_prompt: self.system_prompt.or_else(|| defaults.system_prompt.clone()),
            temperature: self.temperature.or(defaults.temperature),
            top_k: self.top_k.or(defaults.top_k),
            top_p: self.top_p.or(defaults.top_p),
            max_output_tokens: self.max_output_tokens.or(defaults.max_output_tokens),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub audio_url: Option<String>,
    pub model: Option<String>,
    pub context: Option<MessageContext>,
    pub config: Option<ModelConfig>,
}

impl Message {
    /// Pruning weight; turns without a context count as 0.
    pub fn importance(&self) -> f64 {
        self.context.as_ref().map_or(0.0, |c| c.importance)
    }
}

/// A turn that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub content: String,
    pub role: Role,
    pub audio_url: Option<String>,
    pub model: Option<String>,
    pub context: Option<MessageContext>,
    pub config: Option<ModelConfig>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role,
            audio_url: None,
            model: None,
            context: None,
            config: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_context(mut self, context: MessageContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_config(mut self, config: ModelConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_audio_url(mut self, audio_url: Option<String>) -> Self {
        self.audio_url = audio_url;
        self
    }
}
