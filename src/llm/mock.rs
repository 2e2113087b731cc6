//! Scripted [`TextGenerator`] for tests. Records every prompt it receives.

use super::{ChatTurn, LlmError, TextGenerator};
use crate::models::ModelConfig;
use async_trait::async_trait;
use std::sync::Mutex;

type Responder = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
    /// History length for chat calls, 0 for completions.
    pub turns: usize,
}

pub struct ScriptedGenerator {
    responder: Responder,
    models: Option<Vec<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGenerator {
    /// `respond` sees the prompt (or the last chat turn); `None` fails the call.
    pub fn from_fn(respond: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(respond),
            models: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::from_fn(|_| None)
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = Some(models.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn answer(&self, model: &str, prompt: &str, turns: usize) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
            turns,
        });
        (self.responder)(prompt).ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        self.answer(model, prompt, 0)
    }

    async fn chat(
        &self,
        model: &str,
        history: &[ChatTurn],
        _config: Option<&ModelConfig>,
    ) -> Result<String, LlmError> {
        let last = history.last().map(|t| t.content.as_str()).unwrap_or_default();
        self.answer(model, last, history.len())
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        self.models.clone().ok_or(LlmError::NotConfigured)
    }
}
