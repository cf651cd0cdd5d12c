// LanceDB vector database module
// Handles vector storage and similarity search for document embeddings


pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::VectorStore;

/// Row stored in the LanceDB collection table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique identifier within the collection
    pub id: String,
    /// Embedding of `document`
    pub vector: Vec<f32>,
    /// The original document text
    pub document: String,
    /// Model that produced `vector`; queries must use the same model
    pub embedding_model: String,
    /// RFC 3339 timestamp of insertion
    pub created_at: String,
}
