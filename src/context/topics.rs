use super::ContextManager;
use crate::llm::LlmError;
use tracing::warn;

/// Splits a comma-separated answer into trimmed, non-empty topics.
pub fn parse_topics(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}

impl ContextManager {
    /// Topics mentioned in `content`; empty when the model call fails.
    pub async fn extract_topics(&self, content: &str, preferred_model: Option<&str>) -> Vec<String> {
        match self.try_extract_topics(content, preferred_model).await {
            Ok(topics) => topics,
            Err(e) => {
                warn!("Topic extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    pub(super) async fn try_extract_topics(
        &self,
        content: &str,
        preferred_model: Option<&str>,
    ) -> Result<Vec<String>, LlmError> {
        let model = self.model_for(preferred_model);
        let prompt = format!(
            "Extract key topics from this message as a comma-separated list: \"{}\"",
            content
        );
        let response = self.generator.complete(&model, &prompt).await?;
        Ok(parse_topics(&response))
    }
}
