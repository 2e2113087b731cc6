//! Turn handling: context building, persistence and reply generation.

use crate::config::Config;
use crate::context::{ContextManager, ContextSettings};
use crate::db::Database;
use crate::llm::{ChatTurn, LlmClient, LlmError, TextGenerator};
use crate::models::{Message, MessageContext, ModelConfig, NewMessage, Role};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Store and lock failures.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
    #[error("model {model} failed to reply: {source}")]
    Reply {
        model: String,
        #[source]
        source: LlmError,
        /// The user turn, already stored.
        user_message: Box<Message>,
    },
}

/// An incoming turn as received from a client.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub content: String,
    pub role: Role,
    pub audio_url: Option<String>,
    pub model: Option<String>,
    pub config: Option<ModelConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyValidation {
    pub valid: bool,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatExchange {
    pub user_message: Message,
    pub assistant_message: Option<Message>,
}

pub struct ChatService {
    config: RwLock<Config>,
    db: Database,
    context: RwLock<Arc<ContextManager>>,
}

impl ChatService {
    pub fn new(config: Config, db: Database) -> anyhow::Result<Self> {
        let generator: Arc<dyn TextGenerator> = Arc::new(LlmClient::new(&config)?);
        Ok(Self::with_generator(config, db, generator))
    }

    pub fn with_generator(config: Config, db: Database, generator: Arc<dyn TextGenerator>) -> Self {
        let manager = ContextManager::new(generator, ContextSettings::from_config(&config));
        Self {
            config: RwLock::new(config),
            db,
            context: RwLock::new(Arc::new(manager)),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> anyhow::Result<Config> {
        self.config
            .read()
            .map(|c| c.clone())
            .map_err(|_| anyhow::anyhow!("Config lock poisoned"))
    }

    /// Manager for one request. Later reconfiguration does not affect it.
    pub fn context_manager(&self) -> anyhow::Result<Arc<ContextManager>> {
        self.context
            .read()
            .map(|m| Arc::clone(&m))
            .map_err(|_| anyhow::anyhow!("Context manager lock poisoned"))
    }

    /// Swaps in a client for `api_key`. Requests already running keep the
    /// manager they started with.
    pub fn reconfigure(&self, api_key: &str) -> anyhow::Result<()> {
        let config = self.config()?.with_api_key(api_key);
        let generator: Arc<dyn TextGenerator> = Arc::new(LlmClient::new(&config)?);
        self.install(config, generator)
    }

    pub fn install(&self, config: Config, generator: Arc<dyn TextGenerator>) -> anyhow::Result<()> {
        let manager = ContextManager::new(generator, ContextSettings::from_config(&config));
        *self
            .context
            .write()
            .map_err(|_| anyhow::anyhow!("Context manager lock poisoned"))? = Arc::new(manager);
        *self
            .config
            .write()
            .map_err(|_| anyhow::anyhow!("Config lock poisoned"))? = config;
        info!("Chat service reconfigured with a new API key");
        Ok(())
    }

    pub async fn list_messages(&self) -> Result<Vec<Message>, ChatError> {
        Ok(self.db.run_blocking(|db| db.list_messages()).await?)
    }

    pub async fn clear_messages(&self) -> Result<usize, ChatError> {
        Ok(self.db.run_blocking(|db| db.clear_messages()).await?)
    }

    /// Stores an incoming turn. User turns get a context and a reply; an
    /// assistant turn is stored as sent.
    pub async fn handle_message(&self, incoming: IncomingMessage) -> Result<ChatExchange, ChatError> {
        let manager = self.context_manager()?;
        let config = self.config()?;

        let model = incoming
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| config.default_model.clone());
        let defaults = ModelConfig {
            system_prompt: Some(config.system_prompt.clone()),
            ..ModelConfig::default()
        };
        let generation = match incoming.config.clone() {
            Some(requested) => requested.or_defaults(&defaults),
            None => defaults,
        };

        if incoming.role == Role::Assistant {
            let new_message = NewMessage::new(Role::Assistant, incoming.content)
                .with_model(model)
                .with_audio_url(incoming.audio_url);
            let stored = self.db.run_blocking(move |db| db.add_message(new_message)).await?;
            return Ok(ChatExchange {
                user_message: stored,
                assistant_message: None,
            });
        }

        if incoming.content.trim().is_empty() && incoming.audio_url.is_none() {
            return Err(ChatError::InvalidRequest(
                "message content must not be empty".to_string(),
            ));
        }

        let history = self.db.run_blocking(|db| db.list_messages()).await?;
        let context = manager
            .build_message_context(&incoming.content, &history, Some(&model))
            .await;

        let new_message = NewMessage::new(Role::User, incoming.content)
            .with_model(model.clone())
            .with_context(context)
            .with_config(generation.clone())
            .with_audio_url(incoming.audio_url);
        let user_message = self.db.run_blocking(move |db| db.add_message(new_message)).await?;
        info!("Stored user message {} for model {}", user_message.id, model);

        let mut turns: Vec<ChatTurn> = manager
            .prune_context(history)
            .into_iter()
            .map(|m| ChatTurn::new(m.role, m.content))
            .collect();
        turns.push(ChatTurn::new(Role::User, user_message.content.clone()));

        let reply = match manager
            .generator()
            .chat(&model, &turns, Some(&generation))
            .await
        {
            Ok(reply) => reply,
            Err(source) => {
                error!("Model {} failed to reply to message {}: {}", model, user_message.id, source);
                return Err(ChatError::Reply {
                    model,
                    source,
                    user_message: Box::new(user_message),
                });
            }
        };

        // A reply is relevant to the turn it answers and nothing else.
        let reply_message = NewMessage::new(Role::Assistant, reply)
            .with_model(model)
            .with_context(MessageContext::minimal(vec![user_message.id]))
            .with_config(generation);
        let assistant_message = self
            .db
            .run_blocking(move |db| db.add_message(reply_message))
            .await?;

        Ok(ChatExchange {
            user_message,
            assistant_message: Some(assistant_message),
        })
    }

    /// Checks `api_key` by listing models with it. A working key becomes the
    /// active credential.
    pub async fn validate_key(&self, api_key: &str) -> Result<KeyValidation, ChatError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ChatError::InvalidRequest("apiKey must not be empty".to_string()));
        }

        let config = self.config()?.with_api_key(api_key);
        let candidate: Arc<dyn TextGenerator> = Arc::new(LlmClient::new(&config)?);
        self.validate_with(config, candidate).await
    }

    pub(crate) async fn validate_with(
        &self,
        config: Config,
        candidate: Arc<dyn TextGenerator>,
    ) -> Result<KeyValidation, ChatError> {
        let models = match candidate.list_models().await {
            Ok(models) if models.is_empty() => config.model_catalog.clone(),
            Ok(models) => models,
            Err(e) => {
                warn!("API key validation failed: {}", e);
                return Ok(KeyValidation {
                    valid: false,
                    models: Vec::new(),
                });
            }
        };
        self.install(config, candidate)?;
        Ok(KeyValidation {
            valid: true,
            models,
        })
    }

    /// Models the active credential can use, or the configured catalog.
    pub async fn available_models(&self) -> Result<Vec<String>, ChatError> {
        let manager = self.context_manager()?;
        let catalog = self.config()?.model_catalog;
        match manager.generator().list_models().await {
            Ok(models) if !models.is_empty() => Ok(models),
            Ok(_) => Ok(catalog),
            Err(e) => {
                warn!("Model listing failed, using catalog: {}", e);
                Ok(catalog)
            }
        }
    }
}
