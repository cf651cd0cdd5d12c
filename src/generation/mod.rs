// Generation module
// Prompt construction and text generation

pub mod prompt;


use crate::gemini::GeminiClient;
use crate::{RagError, Result};

pub use prompt::{NOT_FOUND_PHRASE, build_prompt, build_context};

/// Produces text for a prompt
pub trait Generator: Send + Sync {
    /// Identifier of the model producing the text
    fn model(&self) -> &str;

    fn generate(&self, prompt: &str) -> Result<String>;
}

impl<T: Generator + ?Sized> Generator for &T {
    #[inline]
    fn model(&self) -> &str {
        (**self).model()
    }

    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt)
    }
}

impl Generator for GeminiClient {
    #[inline]
    fn model(&self) -> &str {
        self.generation_model()
    }

    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_content(prompt)
            .map_err(|e| RagError::Generation(format!("{e:#}")))
    }
}
