use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single row returned by the knowledge query gateway, keyed by column name.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to or received from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// A ranked hit from the vector search gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Patent name used as the item identifier in a workflow run.
    pub id: String,
    /// Applicant, when known.
    #[serde(default)]
    pub company: Option<String>,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Lifecycle of a task node within one run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Done,
    Failed,
    /// Never started because the run aborted first.
    Skipped,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Done => "done",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Progress events emitted by the workflow executor.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    RunStarted {
        run_id: String,
        items: usize,
    },
    NodeStarted {
        node_id: String,
    },
    NodeCompleted {
        node_id: String,
        degraded: bool,
        elapsed_ms: u64,
    },
    NodeFailed {
        node_id: String,
        error: String,
    },
    RunCompleted {
        run_id: String,
        succeeded: bool,
        elapsed_ms: u64,
    },
}
