use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info};

use opscout_core::error::Result;
use opscout_core::traits::KnowledgeQuery;
use opscout_core::types::Record;

use crate::embeddings::EmbeddingProvider;
use crate::vector_store::VectorIndex;

/// Default number of documents embedded per request.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Exports one row per patent with its company and linked concepts.
pub const EXPORT_QUERY: &str = "MATCH (p:Patent)
OPTIONAL MATCH (c:Company)-[:申请]->(p)
OPTIONAL MATCH (p)-[:核心创新是]->(innovation:创新点)
OPTIONAL MATCH (p)-[:旨在解决]->(problem:待解决问题)
OPTIONAL MATCH (p)-[:应用于]->(area:应用领域)
RETURN
    p.name AS patent_name,
    c.name AS company_name,
    collect(DISTINCT innovation.name) AS innovations,
    collect(DISTINCT problem.name) AS problems_solved,
    collect(DISTINCT area.name) AS application_areas";

/// A patent and the graph concepts attached to it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PatentDocument {
    #[serde(default)]
    pub patent_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub innovations: Vec<String>,
    #[serde(default)]
    pub problems_solved: Vec<String>,
    #[serde(default)]
    pub application_areas: Vec<String>,
}

impl PatentDocument {
    pub fn from_record(record: &Record) -> Result<Self> {
        let value = serde_json::Value::Object(record.clone());
        Ok(serde_json::from_value(value)?)
    }

    /// Render as descriptive text for embedding.
    pub fn serialize(&self) -> String {
        let title = if self.patent_name.is_empty() {
            "Unknown patent"
        } else {
            &self.patent_name
        };

        let mut parts = vec![match self.company_name.as_deref() {
            Some(company) if !company.is_empty() => {
                format!("Patent \"{}\", filed by \"{}\".", title, company)
            }
            _ => format!("Patent \"{}\".", title),
        }];

        if !self.innovations.is_empty() {
            parts.push(format!(
                "Core innovations: {}.",
                self.innovations.join(", ")
            ));
        }
        if !self.problems_solved.is_empty() {
            parts.push(format!(
                "It addresses problems such as \"{}\".",
                self.problems_solved.join(", ")
            ));
        }
        if !self.application_areas.is_empty() {
            parts.push(format!(
                "Mainly applied in {}.",
                self.application_areas.join(", ")
            ));
        }

        parts.join(" ")
    }
}

/// Stable index key: position plus the first 50 alphanumeric chars of the name.
pub fn document_id(position: usize, patent_name: &str) -> String {
    let safe: String = patent_name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(50)
        .collect();
    format!("patent_{}_{}", position, safe)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub exported: usize,
    pub indexed: usize,
    pub failed_batches: usize,
}

/// Export patents from the graph, embed them in batches, and store them.
///
/// A failed batch is logged and skipped; the remaining batches still run.
pub async fn index_patents(
    knowledge: Arc<dyn KnowledgeQuery>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: &VectorIndex,
    batch_size: usize,
) -> Result<IndexReport> {
    let records = knowledge
        .query(EXPORT_QUERY, serde_json::json!({}))
        .await?;

    let docs = records
        .iter()
        .map(PatentDocument::from_record)
        .collect::<Result<Vec<_>>>()?;

    let mut report = IndexReport {
        exported: docs.len(),
        ..Default::default()
    };
    if docs.is_empty() {
        info!("No patents exported from the knowledge graph");
        return Ok(report);
    }

    let batch_size = batch_size.max(1);
    for (batch_no, batch) in docs.chunks(batch_size).enumerate() {
        let offset = batch_no * batch_size;
        let texts: Vec<String> = batch.iter().map(PatentDocument::serialize).collect();

        let stored = match embedder.embed(&texts).await {
            Ok(vectors) => batch
                .iter()
                .zip(&vectors)
                .enumerate()
                .try_for_each(|(i, (doc, vector))| {
                    index.upsert(&document_id(offset + i, &doc.patent_name), doc, vector)
                }),
            Err(e) => Err(e),
        };

        match stored {
            Ok(()) => report.indexed += batch.len(),
            Err(e) => {
                error!(batch = batch_no + 1, error = %e, "Failed to index batch");
                report.failed_batches += 1;
            }
        }
    }

    info!(
        indexed = report.indexed,
        failed_batches = report.failed_batches,
        "Indexing complete"
    );
    Ok(report)
}
