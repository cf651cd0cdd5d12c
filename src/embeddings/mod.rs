// Embeddings module
// Text to vector conversion behind a trait so the pipeline can run against fakes

#[cfg(test)]
mod tests;

use crate::gemini::GeminiClient;
use crate::{RagError, Result};

pub type Embedding = Vec<f32>;

/// Converts text into fixed-length vectors
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors
    fn model(&self) -> &str;

    /// Embed every input, returning one vector per input in input order
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single text
    #[inline]
    fn embed_one(&self, text: &str) -> Result<Embedding> {
        self.embed(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding returned for input".to_string()))
    }
}

impl<T: Embedder + ?Sized> Embedder for &T {
    #[inline]
    fn model(&self) -> &str {
        (**self).model()
    }

    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        (**self).embed(texts)
    }
}

impl Embedder for GeminiClient {
    #[inline]
    fn model(&self) -> &str {
        self.embedding_model()
    }

    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let vectors = self
            .embed_contents(texts)
            .map_err(|e| RagError::Embedding(format!("{e:#}")))?;

        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }
}
