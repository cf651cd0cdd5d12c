// RAG orchestration
// Sequences embed -> store -> query -> retrieve -> augment -> generate


use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::settings::DEFAULT_TOP_K;
use crate::database::{Document, DocumentStore, RetrievedDocument, StoredDocument};
use crate::embeddings::Embedder;
use crate::generation::{Generator, build_context, build_prompt};
use crate::{RagError, Result};

/// Result of an indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// The collection was empty and has been populated
    Indexed { count: usize },
    /// The collection already held documents and was left untouched
    Skipped { count: usize },
    /// The collection held different documents and was rebuilt
    Rebuilt { count: usize },
}

impl IndexOutcome {
    /// Number of documents in the collection after indexing
    #[inline]
    pub fn count(self) -> usize {
        match self {
            Self::Indexed { count } | Self::Skipped { count } | Self::Rebuilt { count } => count,
        }
    }
}

/// A context-grounded answer and everything that went into it
#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub question: String,
    pub retrieved: Vec<RetrievedDocument>,
    pub context: String,
    pub prompt: String,
    pub answer: String,
}

/// Answers to the same question with and without retrieved context
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub without_context: String,
    pub with_context: RagAnswer,
}

pub struct RagPipeline<E, G, S> {
    embedder: E,
    generator: G,
    store: S,
    top_k: usize,
    rebuild_on_change: bool,
}

impl<E, G, S> RagPipeline<E, G, S>
where
    E: Embedder,
    G: Generator,
    S: DocumentStore,
{
    #[inline]
    pub fn new(embedder: E, generator: G, store: S) -> Self {
        Self {
            embedder,
            generator,
            store,
            top_k: DEFAULT_TOP_K,
            rebuild_on_change: true,
        }
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// When false, a non-empty collection is never re-indexed, even if stale
    #[inline]
    pub fn with_rebuild_on_change(mut self, rebuild: bool) -> Self {
        self.rebuild_on_change = rebuild;
        self
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Index `documents` unless the collection already holds exactly them
    #[inline]
    pub async fn index(&mut self, documents: &[Document]) -> Result<IndexOutcome> {
        if documents.is_empty() {
            return Err(RagError::Config("No documents to index".to_string()));
        }

        let count = self.store.count().await?;
        if count == 0 {
            let count = self.embed_and_store(documents).await?;
            return Ok(IndexOutcome::Indexed { count });
        }

        let stored = self.store.documents().await?;
        if self.matches_stored(&stored, documents) {
            info!(
                "Collection {} already holds these {} documents, skipping indexing",
                self.store.collection_name(),
                count
            );
            return Ok(IndexOutcome::Skipped { count });
        }

        if !self.rebuild_on_change {
            warn!(
                "Collection {} holds {} documents that differ from the requested set; keeping stale data",
                self.store.collection_name(),
                count
            );
            return Ok(IndexOutcome::Skipped { count });
        }

        warn!(
            "Collection {} is out of date, rebuilding",
            self.store.collection_name()
        );
        self.store.reset().await?;
        let count = self.embed_and_store(documents).await?;
        Ok(IndexOutcome::Rebuilt { count })
    }

    /// Drop the collection and index `documents` from scratch
    #[inline]
    pub async fn index_fresh(&mut self, documents: &[Document]) -> Result<IndexOutcome> {
        if documents.is_empty() {
            return Err(RagError::Config("No documents to index".to_string()));
        }

        self.store.reset().await?;
        let count = self.embed_and_store(documents).await?;
        Ok(IndexOutcome::Indexed { count })
    }

    fn matches_stored(&self, stored: &[StoredDocument], documents: &[Document]) -> bool {
        if stored.len() != documents.len() {
            return false;
        }

        if stored
            .iter()
            .any(|s| s.embedding_model != self.embedder.model())
        {
            debug!("Stored embeddings come from a different model");
            return false;
        }

        let wanted: HashSet<(&str, &str)> = documents
            .iter()
            .map(|d| (d.id.as_str(), d.text.as_str()))
            .collect();
        stored
            .iter()
            .all(|s| wanted.contains(&(s.document.id.as_str(), s.document.text.as_str())))
    }

    async fn embed_and_store(&mut self, documents: &[Document]) -> Result<usize> {
        info!(
            "Embedding {} documents with {}",
            documents.len(),
            self.embedder.model()
        );

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();
        let vectors = self.embedder.embed(&texts)?;

        let model = self.embedder.model().to_string();
        self.store.add(&ids, &vectors, &texts, &model).await?;

        info!(
            "Indexed {} documents into {}",
            documents.len(),
            self.store.collection_name()
        );
        Ok(documents.len())
    }

    /// Embed the question and return the nearest documents
    ///
    /// Fails when the collection was embedded by a different model than the question would be.
    #[inline]
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedDocument>> {
        let question = validate_question(question)?;

        let model = self.embedder.model();
        if let Some(stored) = self.store.embedding_model().filter(|stored| *stored != model) {
            return Err(RagError::Database(format!(
                "Collection {} was embedded with {}, but questions are embedded with {}; re-index with 'rag-workshop index --reset'",
                self.store.collection_name(),
                stored,
                model
            )));
        }

        debug!("Embedding question");
        let vector = self.embedder.embed_one(question)?;

        let retrieved = self.store.query(&vector, self.top_k).await?;
        debug!("Retrieved {} documents", retrieved.len());
        Ok(retrieved)
    }

    /// Retrieve context and build the prompt; the answer is left empty
    async fn prepare(&self, question: &str) -> Result<RagAnswer> {
        let question = validate_question(question)?.to_string();
        let retrieved = self.retrieve(&question).await?;
        let context = build_context(retrieved.iter().map(|doc| doc.text.as_str()));
        let prompt = build_prompt(&context, &question);

        Ok(RagAnswer {
            question,
            retrieved,
            context,
            prompt,
            answer: String::new(),
        })
    }

    /// Answer `question` from retrieved context only
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<RagAnswer> {
        let mut rag = self.prepare(question).await?;

        info!("Generating answer with {}", self.generator.model());
        rag.answer = self.generator.generate(&rag.prompt)?;
        Ok(rag)
    }

    /// Answer `question` with the raw model, no retrieval
    #[inline]
    pub fn ask_without_context(&self, question: &str) -> Result<String> {
        let question = validate_question(question)?;
        self.generator.generate(question)
    }

    /// Answer `question` both ways; the two generation calls run concurrently
    #[inline]
    pub async fn compare(&self, question: &str) -> Result<Comparison> {
        let mut rag = self.prepare(question).await?;

        info!(
            "Generating answers with and without context using {}",
            self.generator.model()
        );
        let generator = &self.generator;
        let (question, prompt) = (rag.question.as_str(), rag.prompt.as_str());
        let (without_context, answer) = std::thread::scope(|scope| {
            let raw = scope.spawn(|| generator.generate(question));
            let augmented = generator.generate(prompt);
            let raw = raw
                .join()
                .map_err(|_| RagError::Generation("Generation thread panicked".to_string()));
            (raw, augmented)
        });

        let without_context = without_context??;
        rag.answer = answer?;

        Ok(Comparison {
            without_context,
            with_context: rag,
        })
    }
}

/// Trim the question, rejecting empty input before any external call
#[inline]
pub fn validate_question(question: &str) -> Result<&str> {
    let question = question.trim();
    if question.is_empty() {
        return Err(RagError::EmptyQuestion);
    }
    Ok(question)
}
