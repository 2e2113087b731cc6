use super::ContextManager;
use crate::llm::LlmError;
use crate::models::Message;
use tracing::warn;

fn summary_prompt(messages: &[Message]) -> String {
    let transcript = messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Summarize the following conversation in a concise way that captures the key points and context:\n{}",
        transcript
    )
}

impl ContextManager {
    /// Condenses `messages` into a short summary. Empty input gives an empty
    /// summary; a failed call gives the last message's content.
    pub async fn summarize_context(
        &self,
        messages: &[Message],
        preferred_model: Option<&str>,
    ) -> String {
        let Some(last) = messages.last() else {
            return String::new();
        };

        match self.try_summarize(messages, preferred_model).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Summarization failed, using last message: {}", e);
                last.content.clone()
            }
        }
    }

    pub(super) async fn try_summarize(
        &self,
        messages: &[Message],
        preferred_model: Option<&str>,
    ) -> Result<String, LlmError> {
        // The most recent turn's model wins over the caller's preference.
        let recent_model = messages.last().and_then(|m| m.model.as_deref());
        let model = self.model_for(recent_model.or(preferred_model));
        self.generator
            .complete(&model, &summary_prompt(messages))
            .await
    }
}
