use super::ContextManager;
use crate::llm::LlmError;
use crate::models::Message;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static SCORE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?|\.\d+").expect("valid score pattern"));

/// One score per response line, in line order.
///
/// A line's score is the first decimal number on it. Lines with no number,
/// or with a number outside `[0, 1]`, score 0 but still occupy their slot:
/// line `i` always belongs to prior message `i`.
pub fn parse_relevance_scores(text: &str) -> Vec<f64> {
    text.trim()
        .lines()
        .map(|line| {
            SCORE_PATTERN
                .find(line)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .filter(|score| (0.0..=1.0).contains(score))
                .unwrap_or(0.0)
        })
        .collect()
}

fn relevance_prompt(current_message: &str, history: &[Message]) -> String {
    let listing = history
        .iter()
        .map(|m| format!("{}: {}", m.id, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given the current message: \"{}\"\n\
         Rate the relevance of each previous message (0-1). \
         Answer with one line per message, in the same order, containing only the score:\n{}",
        current_message, listing
    )
}

impl ContextManager {
    /// Ids of prior turns judged relevant to `current_message`, in history
    /// order. Falls back to the most recent turns when the model call fails.
    pub async fn get_relevant_messages(
        &self,
        current_message: &str,
        history: &[Message],
        preferred_model: Option<&str>,
    ) -> Vec<i64> {
        if history.is_empty() {
            return Vec::new();
        }

        match self
            .try_relevant_messages(current_message, history, preferred_model)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Relevance scoring failed, using most recent messages: {}", e);
                self.recent_ids(history)
            }
        }
    }

    pub(super) async fn try_relevant_messages(
        &self,
        current_message: &str,
        history: &[Message],
        preferred_model: Option<&str>,
    ) -> Result<Vec<i64>, LlmError> {
        let model = self.model_for(preferred_model);
        let prompt = relevance_prompt(current_message, history);
        let response = self.generator.complete(&model, &prompt).await?;
        if response.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let scores = parse_relevance_scores(&response);
        if scores.len() != history.len() {
            debug!(
                "Relevance response has {} lines for {} messages",
                scores.len(),
                history.len()
            );
        }

        let threshold = self.settings.relevance_threshold;
        Ok(history
            .iter()
            .zip(scores.iter().copied().chain(std::iter::repeat(0.0)))
            .filter(|(_, score)| *score >= threshold)
            .map(|(m, _)| m.id)
            .collect())
    }
}
