pub mod document;
pub mod embeddings;
pub mod neo4j;
pub mod vector_store;

pub use document::{index_patents, IndexReport, PatentDocument, DEFAULT_BATCH_SIZE};
pub use embeddings::{EmbeddingProvider, HttpEmbeddingProvider};
pub use neo4j::Neo4jClient;
pub use vector_store::{SemanticSearch, VectorIndex};
