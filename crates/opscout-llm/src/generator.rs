use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::debug;

use opscout_core::config::ModelConfig;
use opscout_core::error::{OpscoutError, Result};
use opscout_core::traits::{LlmClient, TextGenerator};
use opscout_core::types::{ChatMessage, StopReason, StreamDelta};

/// Text-generation gateway backed by a streaming chat model.
///
/// Each call is a fresh two-message conversation: the node's instructions as
/// the system prompt and its structured findings as the user turn.
pub struct LlmTextGenerator {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl LlmTextGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { llm, config }
    }
}

impl TextGenerator for LlmTextGenerator {
    fn generate(
        &self,
        role: &str,
        instructions: &str,
        input: &str,
    ) -> BoxFuture<'_, Result<String>> {
        let role = role.to_string();
        let messages = vec![ChatMessage::system(instructions), ChatMessage::user(input)];

        Box::pin(async move {
            let mut stream = self.llm.chat_stream(&self.config, messages).await?;
            let mut text = String::new();
            let mut truncated = false;

            while let Some(delta) = stream.next().await {
                match delta? {
                    StreamDelta::TextDelta(chunk) => text.push_str(&chunk),
                    StreamDelta::Stop(StopReason::MaxTokens) => truncated = true,
                    StreamDelta::Usage {
                        input_tokens,
                        output_tokens,
                    } => {
                        debug!(role = %role, input_tokens, output_tokens, "Generation usage");
                    }
                    StreamDelta::Stop(_) => {}
                }
            }

            if truncated {
                debug!(role = %role, "Generation stopped at max_tokens");
            }

            let text = text.trim().to_string();
            if text.is_empty() {
                return Err(OpscoutError::LlmStream(format!(
                    "empty response for role '{}'",
                    role
                )));
            }
            Ok(text)
        })
    }
}
