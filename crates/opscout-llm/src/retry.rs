use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::warn;

use opscout_core::config::{ModelConfig, RetryConfig};
use opscout_core::error::{OpscoutError, Result};
use opscout_core::traits::LlmClient;
use opscout_core::types::*;

/// An LLM client that retries transient request failures with exponential backoff.
///
/// Only the request itself is retried; once a stream has been handed out,
/// errors inside it surface to the caller.
pub struct RetryingClient {
    inner: Box<dyn LlmClient>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn LlmClient>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }
}

pub(crate) fn is_retryable(e: &OpscoutError) -> bool {
    match e {
        OpscoutError::LlmRequest(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("504")
                || msg.contains("timeout")
                || msg.contains("timed out")
                || msg.contains("connection")
        }
        OpscoutError::LlmStream(_) => true,
        _ => false,
    }
}

pub(crate) fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;
            let mut attempt = 0;

            loop {
                match self.inner.chat_stream(&config, messages.clone()).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying LLM request"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use futures::StreamExt;
    use opscout_test_utils::model_config;

    /// Fails with the given error `failures` times, then streams "ok".
    struct FlakyClient {
        failures: u32,
        error: fn() -> OpscoutError,
        calls: Arc<AtomicU32>,
    }

    impl LlmClient for FlakyClient {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.failures {
                    return Err((self.error)());
                }
                let items = vec![Ok(StreamDelta::TextDelta("ok".into()))];
                Ok(Box::pin(futures::stream::iter(items)) as BoxStream<'_, Result<StreamDelta>>)
            })
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&OpscoutError::LlmRequest("HTTP 429 Too Many Requests".into())));
        assert!(is_retryable(&OpscoutError::LlmRequest("connection reset".into())));
        assert!(is_retryable(&OpscoutError::LlmStream("eof".into())));
        assert!(!is_retryable(&OpscoutError::LlmRequest("HTTP 401: bad key".into())));
        assert!(!is_retryable(&OpscoutError::Validation("x".into())));
    }

    #[test]
    fn test_backoff_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
        };
        let d = calculate_backoff(8, &config);
        assert!(d.as_millis() <= 4800);
        assert!(d.as_millis() >= 3200);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(FlakyClient {
                failures: 2,
                error: || OpscoutError::LlmRequest("HTTP 503".into()),
                calls: calls.clone(),
            }),
            fast_retry(3),
        );
        let mut stream = client.chat_stream(&model_config(), vec![]).await.unwrap();
        assert!(matches!(stream.next().await, Some(Ok(StreamDelta::TextDelta(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(FlakyClient {
                failures: 5,
                error: || OpscoutError::LlmRequest("HTTP 401".into()),
                calls: calls.clone(),
            }),
            fast_retry(3),
        );
        assert!(client.chat_stream(&model_config(), vec![]).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            Box::new(FlakyClient {
                failures: 10,
                error: || OpscoutError::LlmRequest("timeout".into()),
                calls: calls.clone(),
            }),
            fast_retry(2),
        );
        assert!(client.chat_stream(&model_config(), vec![]).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
