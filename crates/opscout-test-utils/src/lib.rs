//! Mock gateways and fixtures shared by the opscout test suites.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use opscout_core::config::ModelConfig;
use opscout_core::error::{OpscoutError, Result};
use opscout_core::traits::{KnowledgeQuery, TextGenerator, VectorSearch};
use opscout_core::types::{Candidate, Record};

/// Minimal model config for clients under test.
pub fn model_config() -> ModelConfig {
    ModelConfig {
        provider: "openai".into(),
        model_id: "test-model".into(),
        api_key: None,
        base_url: Some("http://127.0.0.1:9".into()),
        max_tokens: 256,
        temperature: 0.0,
        retry: None,
    }
}

/// Build a [`Record`] from a JSON object literal.
///
/// Panics if `value` is not an object.
pub fn record(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("record fixture must be a JSON object, got {}", other),
    }
}

/// A single recorded text-generation call.
#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub role: String,
    pub instructions: String,
    pub input: String,
}

/// Text generator that answers from a per-role script.
///
/// Roles without a scripted reply get `"<role> report"`.
#[derive(Default)]
pub struct MockTextGenerator {
    replies: HashMap<String, String>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<GenerateCall>>,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, role: &str, reply: impl Into<String>) -> Self {
        self.replies.insert(role.to_string(), reply.into());
        self
    }

    pub fn failing_for(mut self, role: &str) -> Self {
        self.failing.insert(role.to_string());
        self
    }

    pub fn with_delay(mut self, role: &str, delay: Duration) -> Self {
        self.delays.insert(role.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, role: &str) -> Vec<GenerateCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.role == role)
            .collect()
    }
}

impl TextGenerator for MockTextGenerator {
    fn generate(
        &self,
        role: &str,
        instructions: &str,
        input: &str,
    ) -> BoxFuture<'_, Result<String>> {
        self.calls.lock().unwrap().push(GenerateCall {
            role: role.to_string(),
            instructions: instructions.to_string(),
            input: input.to_string(),
        });
        let role = role.to_string();

        Box::pin(async move {
            if let Some(delay) = self.delays.get(&role) {
                tokio::time::sleep(*delay).await;
            }
            if self.failing.contains(&role) {
                return Err(OpscoutError::LlmRequest(format!(
                    "HTTP 503: model unavailable for {}",
                    role
                )));
            }
            Ok(self
                .replies
                .get(&role)
                .cloned()
                .unwrap_or_else(|| format!("{} report", role)))
        })
    }
}

enum Scripted {
    Rows(Vec<Record>),
    Fail(String),
}

/// Knowledge gateway that answers by matching a substring of the query text.
///
/// Rules are checked in insertion order; unmatched queries return no rows.
#[derive(Default)]
pub struct MockKnowledgeQuery {
    rules: Vec<(String, Scripted)>,
    calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MockKnowledgeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, needle: &str, rows: Vec<Record>) -> Self {
        self.rules.push((needle.to_string(), Scripted::Rows(rows)));
        self
    }

    pub fn failing_on(mut self, needle: &str, message: &str) -> Self {
        self.rules
            .push((needle.to_string(), Scripted::Fail(message.to_string())));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
        self.calls.lock().unwrap().clone()
    }
}

impl KnowledgeQuery for MockKnowledgeQuery {
    fn query(&self, cypher: &str, params: serde_json::Value) -> BoxFuture<'_, Result<Vec<Record>>> {
        self.calls.lock().unwrap().push((cypher.to_string(), params));
        let outcome = self
            .rules
            .iter()
            .find(|(needle, _)| cypher.contains(needle.as_str()))
            .map(|(_, scripted)| match scripted {
                Scripted::Rows(rows) => Ok(rows.clone()),
                Scripted::Fail(msg) => Err(OpscoutError::KnowledgeQuery(msg.clone())),
            })
            .unwrap_or_else(|| Ok(Vec::new()));
        Box::pin(async move { outcome })
    }
}

/// Vector search over a fixed candidate list.
#[derive(Default)]
pub struct MockVectorSearch {
    candidates: Vec<Candidate>,
    embed_calls: AtomicUsize,
}

impl MockVectorSearch {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            embed_calls: AtomicUsize::new(0),
        }
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }
}

impl VectorSearch for MockVectorSearch {
    fn embed(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        let len = text.chars().count() as f32;
        Box::pin(async move { Ok(vec![len, 1.0]) })
    }

    fn search(&self, _vector: Vec<f32>, k: usize) -> BoxFuture<'_, Result<Vec<Candidate>>> {
        let hits = self.candidates.iter().take(k).cloned().collect();
        Box::pin(async move { Ok(hits) })
    }
}
