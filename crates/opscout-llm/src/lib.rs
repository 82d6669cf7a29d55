pub mod generator;
pub mod providers;
pub mod retry;
pub mod streaming;

use opscout_core::config::ModelConfig;
use opscout_core::error::{OpscoutError, Result};
use opscout_core::traits::LlmClient;

pub use generator::LlmTextGenerator;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client for the configured provider.
///
/// Only the OpenAI chat completions protocol is spoken; other vendors are
/// reached through `base_url`. `[model.retry]` wraps the client in a
/// [`RetryingClient`].
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    let client: Box<dyn LlmClient> = match config.provider.as_str() {
        "openai" | "openai-compatible" => Box::new(OpenAiClient::new()),
        other => {
            return Err(OpscoutError::Config(format!(
                "unsupported model provider '{}' (expected openai or openai-compatible)",
                other
            )))
        }
    };
    Ok(match &config.retry {
        Some(retry) => Box::new(RetryingClient::new(client, retry.clone())),
        None => client,
    })
}
