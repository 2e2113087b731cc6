use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{ChatTurn, LlmError, TextGenerator};
use crate::config::Config;
use crate::models::{ModelConfig, Role};

pub struct LlmClient {
    chat_client: Client<OpenAIConfig>,
    configured: bool,
}

impl LlmClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut chat_config = OpenAIConfig::new().with_api_base(&config.gemini_api_base);

        let configured = if let Some(key) = &config.gemini_api_key {
            chat_config = chat_config.with_api_key(key);
            true
        } else {
            chat_config = chat_config.with_api_key("unused");
            false
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm_timeout_secs))
            .build()?;

        Ok(Self {
            chat_client: Client::with_config(chat_config).with_http_client(http_client),
            configured,
        })
    }

    fn ensure_configured(&self) -> Result<(), LlmError> {
        if self.configured {
            Ok(())
        } else {
            Err(LlmError::NotConfigured)
        }
    }

    #[allow(deprecated)]
    async fn send(
        &self,
        model: &str,
        messages: Vec<ChatCompletionRequestMessage>,
        config: Option<&ModelConfig>,
    ) -> Result<String, LlmError> {
        self.ensure_configured()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model).messages(messages);
        if let Some(config) = config {
            if let Some(temperature) = config.temperature {
                args.temperature(temperature);
            }
            if let Some(top_p) = config.top_p {
                args.top_p(top_p);
            }
            if let Some(max_tokens) = config.max_output_tokens {
                args.max_tokens(max_tokens);
            }
        }
        let request = args.build()?;

        let response = self.chat_client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        debug!("LLM {} answered with {} chars", model, content.len());
        Ok(content)
    }
}

fn to_request_message(turn: &ChatTurn) -> Result<ChatCompletionRequestMessage, LlmError> {
    let message = match turn.role {
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.content.clone())
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.content.clone())
            .build()?
            .into(),
    };
    Ok(message)
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let messages = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()?
            .into()];
        self.send(model, messages, None).await
    }

    async fn chat(
        &self,
        model: &str,
        history: &[ChatTurn],
        config: Option<&ModelConfig>,
    ) -> Result<String, LlmError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 1);

        if let Some(system_prompt) = config.and_then(|c| c.system_prompt.as_deref()) {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt.to_string())
                    .build()?
                    .into(),
            );
        }
        for turn in history {
            messages.push(to_request_message(turn)?);
        }

        self.send(model, messages, config).await
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        self.ensure_configured()?;

        let response = self.chat_client.models().list().await?;
        let models = response
            .data
            .into_iter()
            .map(|model| model.id.trim_start_matches("models/").to_string())
            .collect();
        Ok(models)
    }
}
