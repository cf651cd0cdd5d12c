// Database module
// Document collection backed by LanceDB for nearest-neighbour retrieval

pub mod lancedb;


use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedding;
use crate::{RagError, Result};

pub use self::lancedb::{DocumentRecord, VectorStore};

/// A unit of text with a stable identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
}

impl Document {
    #[inline]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Assign sequential ids (`doc_0`, `doc_1`, ...) to texts in order
    #[inline]
    pub fn sequential<I, S>(texts: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Self::new(format!("doc_{}", i), text))
            .collect()
    }
}

/// A stored document together with the model that embedded it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub document: Document,
    pub embedding_model: String,
}

/// One nearest-neighbour hit; lower distance means more similar
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub id: String,
    pub text: String,
    pub distance: f32,
}

/// A named collection of embedded documents supporting nearest-neighbour queries
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the underlying collection
    fn collection_name(&self) -> &str;

    /// Model that embedded the stored vectors; `None` while the collection is empty
    fn embedding_model(&self) -> Option<&str>;

    /// Insert records from one embedding model; ids must be unique and not already stored
    async fn add_records(&mut self, records: Vec<DocumentRecord>) -> Result<()>;

    /// Return up to `k` documents ordered by ascending distance to `vector`
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>>;

    /// Number of documents in the collection
    async fn count(&self) -> Result<usize>;

    /// Every stored document, ordered by id
    async fn documents(&self) -> Result<Vec<StoredDocument>>;

    /// Drop the whole collection
    async fn reset(&mut self) -> Result<()>;

    /// Insert parallel arrays of ids, vectors and document texts
    async fn add(
        &mut self,
        ids: &[String],
        vectors: &[Embedding],
        documents: &[String],
        embedding_model: &str,
    ) -> Result<()> {
        if vectors.len() != ids.len() || documents.len() != ids.len() {
            return Err(RagError::Database(format!(
                "Length mismatch: {} ids, {} vectors, {} documents",
                ids.len(),
                vectors.len(),
                documents.len()
            )));
        }

        let created_at = chrono::Utc::now().to_rfc3339();
        let records = ids
            .iter()
            .zip(vectors)
            .zip(documents)
            .map(|((id, vector), document)| DocumentRecord {
                id: id.clone(),
                vector: vector.clone(),
                document: document.clone(),
                embedding_model: embedding_model.to_string(),
                created_at: created_at.clone(),
            })
            .collect();

        self.add_records(records).await
    }
}
