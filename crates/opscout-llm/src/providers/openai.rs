use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use opscout_core::config::ModelConfig;
use opscout_core::error::{OpscoutError, Result};
use opscout_core::traits::LlmClient;
use opscout_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible client. Works with OpenAI, DashScope, Ollama, vLLM, Groq, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Resolve the chat completions endpoint from a configured base URL.
pub(crate) fn completions_url(base_url: Option<&str>) -> String {
    let base = base_url.unwrap_or(OPENAI_API_URL).trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

pub(crate) fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    messages
        .into_iter()
        .map(|msg| OaiMessage {
            role: match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: msg.content,
        })
        .collect()
}

pub(crate) fn parse_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.data.trim() == "[DONE]" {
        return vec![];
    }

    let chunk: StreamChunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse SSE chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();

    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    for choice in chunk.choices {
        if let Some(text) = choice.delta.and_then(|d| d.content) {
            if !text.is_empty() {
                deltas.push(Ok(StreamDelta::TextDelta(text)));
            }
        }
        if let Some(reason) = choice.finish_reason {
            let stop = match reason.as_str() {
                "length" => StopReason::MaxTokens,
                "stop_sequence" => StopReason::StopSequence,
                _ => StopReason::EndTurn,
            };
            deltas.push(Ok(StreamDelta::Stop(stop)));
        }
    }

    deltas
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let url = completions_url(config.base_url.as_deref());

            let body = ChatRequest {
                model: config.model_id.clone(),
                messages: convert_messages(messages),
                max_tokens: config.max_tokens,
                temperature: if config.temperature > 0.0 {
                    Some(config.temperature)
                } else {
                    None
                },
                stream: true,
            };

            let mut req = self.http.post(&url).json(&body);

            if let Some(api_key) = &config.api_key {
                req = req.bearer_auth(api_key);
            }

            let response = req
                .send()
                .await
                .map_err(|e| OpscoutError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(OpscoutError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let sse_stream = SseStream::new(response.bytes_stream());

            let delta_stream = sse_stream
                .map(|event| futures::stream::iter(parse_chunk(event)))
                .flatten();

            Ok(Box::pin(delta_stream) as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}
