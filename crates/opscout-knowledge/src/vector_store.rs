use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use tracing::debug;

use opscout_core::error::{OpscoutError, Result};
use opscout_core::traits::VectorSearch;
use opscout_core::types::Candidate;

use crate::document::PatentDocument;
use crate::embeddings::{cosine_similarity, EmbeddingProvider};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS patents (
        id TEXT PRIMARY KEY,
        patent_name TEXT NOT NULL,
        company_name TEXT,
        document TEXT NOT NULL,
        embedding BLOB NOT NULL
    );";

fn db_err(e: impl std::fmt::Display) -> OpscoutError {
    OpscoutError::Database(e.to_string())
}

/// SQLite-backed store of patent embeddings with brute-force cosine search.
pub struct VectorIndex {
    conn: Mutex<Connection>,
}

impl VectorIndex {
    /// Open or create an index at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| db_err(format!("Failed to create index directory: {}", e)))?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Vector index opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory index (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace one patent document and its embedding.
    pub fn upsert(&self, id: &str, doc: &PatentDocument, embedding: &[f32]) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        let blob: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        conn.execute(
            "INSERT OR REPLACE INTO patents (id, patent_name, company_name, document, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, doc.patent_name, doc.company_name, doc.serialize(), blob],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Number of indexed patents.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(db_err)?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM patents", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(n as usize)
    }

    /// Rank every indexed patent against `query_vec`, best first.
    pub fn search_similar(&self, query_vec: &[f32], limit: usize) -> Result<Vec<Candidate>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare("SELECT patent_name, company_name, embedding FROM patents")
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let company: Option<String> = row.get(1)?;
                let blob: Vec<u8> = row.get(2)?;
                Ok((name, company, blob))
            })
            .map_err(db_err)?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, company, blob) = row.map_err(db_err)?;
            let embedding: Vec<f32> = blob
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();
            scored.push(Candidate {
                score: cosine_similarity(query_vec, &embedding),
                id,
                company,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

/// Vector search gateway: embeds the topic, then ranks the local index.
pub struct SemanticSearch {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
}

impl SemanticSearch {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }
}

impl VectorSearch for SemanticSearch {
    fn embed(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>>> {
        let texts = vec![text.to_string()];
        Box::pin(async move {
            self.embedder
                .embed(&texts)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| OpscoutError::Embedding("no embedding returned".into()))
        })
    }

    fn search(&self, vector: Vec<f32>, k: usize) -> BoxFuture<'_, Result<Vec<Candidate>>> {
        Box::pin(async move { self.index.search_similar(&vector, k) })
    }
}
