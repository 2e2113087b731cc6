//! Conversation context management.
//!
//! For each new user turn the [`ContextManager`] asks the model which prior
//! turns are relevant, summarizes those, and extracts topics from the new
//! turn. Every remote step has its own fallback; the builder adds a coarser
//! one on top so callers always get a usable [`MessageContext`].
//!
//! Separately, [`prune_context`] bounds the history forwarded for a reply.

mod prune;
mod relevance;
mod summarize;
mod topics;

pub use prune::prune_context;
pub use relevance::parse_relevance_scores;
pub use topics::parse_topics;

use crate::config::Config;
use crate::llm::{LlmError, TextGenerator};
use crate::models::{Message, MessageContext};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const MAX_CONTEXT_MESSAGES: usize = 10;
pub const RELEVANCE_THRESHOLD: f64 = 0.7;
pub const RELEVANCE_FALLBACK_COUNT: usize = 3;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("text generation unavailable, all {attempts} context calls failed: {source}")]
    Unavailable {
        attempts: usize,
        #[source]
        source: LlmError,
    },
}

#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub default_model: String,
    pub max_context_messages: usize,
    pub relevance_threshold: f64,
    pub relevance_fallback_count: usize,
}

impl ContextSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_model: config.default_model.clone(),
            max_context_messages: config.max_context_messages,
            relevance_threshold: config.relevance_threshold,
            relevance_fallback_count: config.relevance_fallback_count,
        }
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            default_model: crate::models::GEMINI_MODELS[0].to_string(),
            max_context_messages: MAX_CONTEXT_MESSAGES,
            relevance_threshold: RELEVANCE_THRESHOLD,
            relevance_fallback_count: RELEVANCE_FALLBACK_COUNT,
        }
    }
}

pub struct ContextManager {
    generator: Arc<dyn TextGenerator>,
    settings: ContextSettings,
}

/// Counts remote calls made while building one context.
#[derive(Default)]
struct StageTally {
    attempted: usize,
    failed: usize,
    last_error: Option<LlmError>,
}

impl StageTally {
    fn record<T>(&mut self, stage: &str, result: Result<T, LlmError>) -> Option<T> {
        self.attempted += 1;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Context {} failed, using fallback: {}", stage, e);
                self.failed += 1;
                self.last_error = Some(e);
                None
            }
        }
    }

    fn into_result(self) -> Result<(), ContextError> {
        match self.last_error {
            Some(source) if self.failed == self.attempted => Err(ContextError::Unavailable {
                attempts: self.attempted,
                source,
            }),
            _ => Ok(()),
        }
    }
}

impl ContextManager {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: ContextSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    /// The generator this manager was built with; reply generation uses the
    /// same one so a request never mixes credentials.
    pub fn generator(&self) -> Arc<dyn TextGenerator> {
        Arc::clone(&self.generator)
    }

    fn model_for(&self, preferred: Option<&str>) -> String {
        preferred
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(self.settings.default_model.as_str())
            .to_string()
    }

    fn recent_ids(&self, history: &[Message]) -> Vec<i64> {
        let start = history
            .len()
            .saturating_sub(self.settings.relevance_fallback_count);
        history[start..].iter().map(|m| m.id).collect()
    }

    /// Builds the context for `content` against all prior turns. Never fails.
    pub async fn build_message_context(
        &self,
        content: &str,
        history: &[Message],
        preferred_model: Option<&str>,
    ) -> MessageContext {
        match self.try_build(content, history, preferred_model).await {
            Ok(context) => context,
            Err(e) => {
                warn!("Context building failed, using minimal context: {}", e);
                MessageContext::minimal(self.recent_ids(history))
            }
        }
    }

    async fn try_build(
        &self,
        content: &str,
        history: &[Message],
        preferred_model: Option<&str>,
    ) -> Result<MessageContext, ContextError> {
        let mut tally = StageTally::default();

        let relevant_ids = if history.is_empty() {
            Vec::new()
        } else {
            let scored = self
                .try_relevant_messages(content, history, preferred_model)
                .await;
            tally
                .record("relevance", scored)
                .unwrap_or_else(|| self.recent_ids(history))
        };

        let relevant: Vec<Message> = history
            .iter()
            .filter(|m| relevant_ids.contains(&m.id))
            .cloned()
            .collect();

        let summary = match relevant.last() {
            None => String::new(),
            Some(last) => {
                let summarized = self.try_summarize(&relevant, preferred_model).await;
                tally
                    .record("summary", summarized)
                    .unwrap_or_else(|| last.content.clone())
            }
        };

        let extracted = self.try_extract_topics(content, preferred_model).await;
        let topics = tally.record("topics", extracted).unwrap_or_default();

        tally.into_result()?;

        debug!(
            "Built context: {} relevant ids, {} topics",
            relevant_ids.len(),
            topics.len()
        );
        Ok(MessageContext {
            summary,
            relevant_ids,
            importance: 1.0,
            topics,
        })
    }

    /// Bounds `messages` to the configured window, see [`prune_context`].
    pub fn prune_context(&self, messages: Vec<Message>) -> Vec<Message> {
        prune_context(messages, self.settings.max_context_messages)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{Message, MessageContext, Role};
    use chrono::Utc;

    pub fn message(id: i64, role: Role, content: &str) -> Message {
        Message {
            id,
            content: content.to_string(),
            role,
            timestamp: Utc::now(),
            audio_url: None,
            model: None,
            context: Some(MessageContext::default()),
            config: None,
        }
    }

    pub fn history(len: i64) -> Vec<Message> {
        (1..=len)
            .map(|id| {
                let role = if id % 2 == 1 { Role::User } else { Role::Assistant };
                message(id, role, &format!("Message {}", id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{history, message};
    use super::*;
    use crate::llm::mock::ScriptedGenerator;
    use crate::models::Role;

    fn manager(generator: Arc<ScriptedGenerator>) -> ContextManager {
        ContextManager::new(generator, ContextSettings::default())
    }

    #[tokio::test]
    async fn test_failing_generator_yields_minimal_context() {
        let generator = Arc::new(ScriptedGenerator::failing());
        let manager = manager(generator.clone());
        let history = history(5);

        let context = manager.build_message_context("hello", &history, None).await;

        assert_eq!(context, MessageContext::minimal(vec![3, 4, 5]));
        assert_eq!(context.summary, "");
        assert!(context.topics.is_empty());
        assert_eq!(context.importance, 1.0);
        // relevance, summary over the fallback ids, topics
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_generator_with_short_history() {
        let manager = manager(Arc::new(ScriptedGenerator::failing()));
        let context = manager
            .build_message_context("hello", &history(2), None)
            .await;
        assert_eq!(context.relevant_ids, vec![1, 2]);

        let context = manager.build_message_context("hello", &[], None).await;
        assert_eq!(context, MessageContext::minimal(Vec::new()));
    }

    #[tokio::test]
    async fn test_end_to_end_hiking_scenario() {
        let generator = Arc::new(ScriptedGenerator::from_fn(|prompt| {
            if prompt.starts_with("Given the current message") {
                Some("0.8\n0.3".to_string())
            } else if prompt.starts_with("Summarize") {
                Some("The user enjoys hiking.".to_string())
            } else {
                Some("biking, outdoor activities".to_string())
            }
        }));
        let manager = manager(generator.clone());
        let history = vec![
            message(1, Role::User, "I like hiking"),
            message(2, Role::Assistant, "Great, any favorite trails?"),
        ];

        let context = manager
            .build_message_context("What about biking?", &history, None)
            .await;

        assert_eq!(context.relevant_ids, vec![1]);
        assert_eq!(context.summary, "The user enjoys hiking.");
        assert_eq!(context.topics, vec!["biking", "outdoor activities"]);
        assert_eq!(context.importance, 1.0);

        let calls = generator.calls();
        assert_eq!(calls.len(), 3);
        // relevance sees both prior turns
        assert!(calls[0].prompt.contains("What about biking?"));
        assert!(calls[0].prompt.contains("I like hiking"));
        assert!(calls[0].prompt.contains("Great, any favorite trails?"));
        // summary sees only turn 1
        assert!(calls[1].prompt.contains("user: I like hiking"));
        assert!(!calls[1].prompt.contains("favorite trails"));
        // topics see only the new content
        assert!(calls[2].prompt.contains("What about biking?"));
        assert!(!calls[2].prompt.contains("hiking"));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_stage_fallbacks() {
        let generator = Arc::new(ScriptedGenerator::from_fn(|prompt| {
            if prompt.starts_with("Summarize") {
                None
            } else if prompt.starts_with("Given the current message") {
                Some("0.9\n0.1\n0.95".to_string())
            } else {
                Some("weather".to_string())
            }
        }));
        let manager = manager(generator);
        let history = history(3);

        let context = manager
            .build_message_context("Is it raining?", &history, None)
            .await;

        assert_eq!(context.relevant_ids, vec![1, 3]);
        // summary falls back to the last relevant turn verbatim
        assert_eq!(context.summary, "Message 3");
        assert_eq!(context.topics, vec!["weather"]);
    }

    #[tokio::test]
    async fn test_nothing_relevant_skips_summary_call() {
        let generator = Arc::new(ScriptedGenerator::from_fn(|prompt| {
            if prompt.starts_with("Given the current message") {
                Some("0.1\n0.2".to_string())
            } else {
                Some("greetings".to_string())
            }
        }));
        let manager = manager(generator.clone());

        let context = manager.build_message_context("hi", &history(2), None).await;

        assert!(context.relevant_ids.is_empty());
        assert_eq!(context.summary, "");
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_preferred_model_used_for_all_stages() {
        let generator = Arc::new(ScriptedGenerator::from_fn(|_| Some("1".to_string())));
        let manager = manager(generator.clone());

        manager
            .build_message_context("hi", &history(1), Some("gemini-1.5-flash"))
            .await;

        assert!(generator
            .calls()
            .iter()
            .all(|c| c.model == "gemini-1.5-flash"));
    }
}
