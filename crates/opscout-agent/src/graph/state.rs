use std::collections::BTreeMap;

use opscout_core::error::{OpscoutError, Result};

/// Where a node's result lands in the [`WorkflowState`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputSlot {
    /// An entry in `node_outputs` under the given key.
    NodeOutput(String),
    Critique,
    FinalReport,
}

impl std::fmt::Display for OutputSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputSlot::NodeOutput(key) => write!(f, "node_outputs.{}", key),
            OutputSlot::Critique => f.write_str("critique"),
            OutputSlot::FinalReport => f.write_str("final_report"),
        }
    }
}

impl OutputSlot {
    /// Wrap `text` as a patch for this slot.
    pub fn patch(&self, text: impl Into<String>) -> StatePatch {
        match self {
            OutputSlot::NodeOutput(key) => StatePatch::NodeOutput {
                key: key.clone(),
                text: text.into(),
            },
            OutputSlot::Critique => StatePatch::Critique(text.into()),
            OutputSlot::FinalReport => StatePatch::FinalReport(text.into()),
        }
    }
}

/// A partial update returned by a node handler.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePatch {
    NodeOutput { key: String, text: String },
    Critique(String),
    FinalReport(String),
}

impl StatePatch {
    pub fn node_output(key: impl Into<String>, text: impl Into<String>) -> Self {
        StatePatch::NodeOutput {
            key: key.into(),
            text: text.into(),
        }
    }

    /// The slot this patch writes.
    pub fn slot(&self) -> OutputSlot {
        match self {
            StatePatch::NodeOutput { key, .. } => OutputSlot::NodeOutput(key.clone()),
            StatePatch::Critique(_) => OutputSlot::Critique,
            StatePatch::FinalReport(_) => OutputSlot::FinalReport,
        }
    }
}

/// Shared state threaded through one workflow run.
///
/// Only the executor mutates it, through [`WorkflowState::apply`]; handlers
/// see immutable snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    items: Vec<String>,
    node_outputs: BTreeMap<String, String>,
    critique: Option<String>,
    final_report: Option<String>,
}

impl WorkflowState {
    pub fn new(items: Vec<String>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn node_output(&self, key: &str) -> Option<&str> {
        self.node_outputs.get(key).map(String::as_str)
    }

    pub fn node_outputs(&self) -> &BTreeMap<String, String> {
        &self.node_outputs
    }

    pub fn critique(&self) -> Option<&str> {
        self.critique.as_deref()
    }

    pub fn final_report(&self) -> Option<&str> {
        self.final_report.as_deref()
    }

    /// Merge a patch. `node_outputs` keys are write-once; the scalar slots
    /// take the latest value.
    pub fn apply(&mut self, patch: StatePatch) -> Result<()> {
        match patch {
            StatePatch::NodeOutput { key, text } => {
                if self.node_outputs.contains_key(&key) {
                    return Err(OpscoutError::DuplicateOutputKey(key));
                }
                self.node_outputs.insert(key, text);
            }
            StatePatch::Critique(text) => self.critique = Some(text),
            StatePatch::FinalReport(text) => self.final_report = Some(text),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_node_outputs() {
        let mut state = WorkflowState::new(vec!["Patent A".into()]);
        state
            .apply(StatePatch::node_output("Association", "assoc"))
            .unwrap();
        state
            .apply(StatePatch::node_output("TechnologyGap", "gap"))
            .unwrap();

        assert_eq!(state.items(), ["Patent A".to_string()]);
        assert_eq!(state.node_output("Association"), Some("assoc"));
        assert_eq!(state.node_outputs().len(), 2);
    }

    #[test]
    fn test_duplicate_output_key_rejected() {
        let mut state = WorkflowState::default();
        state.apply(StatePatch::node_output("Association", "one")).unwrap();
        let err = state
            .apply(StatePatch::node_output("Association", "two"))
            .unwrap_err();

        assert!(matches!(err, OpscoutError::DuplicateOutputKey(ref k) if k == "Association"));
        assert_eq!(state.node_output("Association"), Some("one"));
    }

    #[test]
    fn test_scalars_overwrite() {
        let mut state = WorkflowState::default();
        state.apply(StatePatch::Critique("first".into())).unwrap();
        state.apply(StatePatch::Critique("second".into())).unwrap();
        state.apply(StatePatch::FinalReport("report".into())).unwrap();

        assert_eq!(state.critique(), Some("second"));
        assert_eq!(state.final_report(), Some("report"));
    }

    #[test]
    fn test_slot_patch_round_trip() {
        let slot = OutputSlot::NodeOutput("EmergingTheme".into());
        assert_eq!(slot.patch("degraded").slot(), slot);
        assert_eq!(OutputSlot::Critique.patch("x"), StatePatch::Critique("x".into()));
        assert_eq!(slot.to_string(), "node_outputs.EmergingTheme");
    }
}
