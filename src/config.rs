use crate::models::{DEFAULT_SYSTEM_PROMPT, GEMINI_MODELS};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub default_model: String,
    pub database_url: String,
    pub system_prompt: String,
    pub bind_addr: String,
    pub llm_timeout_secs: u64,
    pub model_catalog: Vec<String>,

    // Context pipeline settings
    pub max_context_messages: usize,
    pub relevance_threshold: f64,
    pub relevance_fallback_count: usize,
}

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
const MODEL_CATALOG_FILE: &str = "models.toml";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let relevance_threshold: f64 = env::var("RELEVANCE_THRESHOLD")
            .unwrap_or_else(|_| "0.7".to_string())
            .parse()
            .unwrap_or(0.7);
        if !(0.0..=1.0).contains(&relevance_threshold) {
            return Err(anyhow::anyhow!(
                "RELEVANCE_THRESHOLD must be between 0 and 1, got {}",
                relevance_threshold
            ));
        }

        Ok(Config {
            gemini_api_key: env::var("GEMINI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            gemini_api_base: env::var("GEMINI_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            default_model: env::var("DEFAULT_MODEL")
                .unwrap_or_else(|_| GEMINI_MODELS[0].to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/voicechat.db".to_string()),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
            model_catalog: Self::load_model_catalog(),
            max_context_messages: env::var("MAX_CONTEXT_MESSAGES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            relevance_threshold,
            relevance_fallback_count: env::var("RELEVANCE_FALLBACK_COUNT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
        })
    }

    /// Fallback model list: `models.toml`, then `MODEL_CATALOG` (JSON array),
    /// then the built-in Gemini ids.
    pub fn load_model_catalog() -> Vec<String> {
        if let Ok(content) = fs::read_to_string(MODEL_CATALOG_FILE) {
            #[derive(Deserialize)]
            struct CatalogWrapper {
                models: Vec<String>,
            }
            if let Ok(wrapper) = toml::from_str::<CatalogWrapper>(&content) {
                if !wrapper.models.is_empty() {
                    return wrapper.models;
                }
            }
        }

        if let Ok(env_models) = env::var("MODEL_CATALOG") {
            if let Ok(models) = serde_json::from_str::<Vec<String>>(&env_models) {
                if !models.is_empty() {
                    return models;
                }
            }
        }

        GEMINI_MODELS.iter().map(|m| m.to_string()).collect()
    }

    /// Copy of this config using a different credential.
    pub fn with_api_key(&self, api_key: &str) -> Self {
        let mut config = self.clone();
        config.gemini_api_key = Some(api_key.trim().to_string()).filter(|k| !k.is_empty());
        config
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("gemini_api_base", &self.gemini_api_base)
            .field("default_model", &self.default_model)
            .field("database_url", &self.database_url)
            .field("system_prompt", &self.system_prompt)
            .field("bind_addr", &self.bind_addr)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("model_catalog", &self.model_catalog)
            .field("max_context_messages", &self.max_context_messages)
            .field("relevance_threshold", &self.relevance_threshold)
            .field("relevance_fallback_count", &self.relevance_fallback_count)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        gemini_api_key: None,
        gemini_api_base: "http://localhost:9/v1".to_string(),
        default_model: "gemini-1.5-pro".to_string(),
        database_url: ":memory:".to_string(),
        system_prompt: "test".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        llm_timeout_secs: 5,
        model_catalog: GEMINI_MODELS.iter().map(|m| m.to_string()).collect(),
        max_context_messages: 10,
        relevance_threshold: 0.7,
        relevance_fallback_count: 3,
    }
}
