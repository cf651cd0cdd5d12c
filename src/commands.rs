
use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::RagError;
use crate::config::{Config, StorageMode};
use crate::corpus::{DEFAULT_QUESTION, builtin_documents, load_documents};
use crate::database::{DocumentStore, RetrievedDocument, VectorStore};
use crate::embeddings::Embedder;
use crate::gemini::GeminiClient;
use crate::generation::Generator;
use crate::rag::{Comparison, IndexOutcome, RagAnswer, RagPipeline, validate_question};

pub type GeminiPipeline = RagPipeline<GeminiClient, GeminiClient, VectorStore>;

/// Build a Gemini client, failing early when the API key is not set
#[inline]
pub fn gemini_client(config: &Config) -> Result<GeminiClient> {
    let api_key = config.api_key().inspect_err(|e| error!("{}", e))?;
    GeminiClient::new(&config.gemini, api_key)
}

/// Open the configured collection and wire it to Gemini for embedding and generation
#[inline]
pub async fn open_pipeline(config: &Config) -> Result<GeminiPipeline> {
    let client = gemini_client(config)?;
    let store = VectorStore::open(config)
        .await
        .context("Failed to open vector store")?;

    Ok(RagPipeline::new(client.clone(), client, store)
        .with_top_k(config.retrieval.top_k)
        .with_rebuild_on_change(config.indexing.rebuild_on_change))
}

/// Commands that only make sense when the collection outlives the process
fn require_persistent(config: &Config, command: &str) -> Result<()> {
    if config.storage.mode == StorageMode::Memory {
        bail!(
            "'rag-workshop {}' does nothing useful with memory storage, the collection is discarded when the command exits. \
             Use 'rag-workshop ask' or 'rag-workshop demo', or set storage.mode = \"persistent\"",
            command
        );
    }
    Ok(())
}

/// Warn about a blank question; `None` means there is nothing to answer
fn question_or_warn(question: &str) -> Result<Option<&str>> {
    match validate_question(question) {
        Ok(question) => Ok(Some(question)),
        Err(RagError::EmptyQuestion) => {
            warn!("Ignoring empty question");
            println!("{} Please enter a question first", style("⚠️").yellow());
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn spinner(message: &str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(ProgressStyle::default_spinner())
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_rule() {
    println!("{}", style("-".repeat(50)).dim());
}

fn print_outcome(outcome: IndexOutcome, collection: &str) {
    match outcome {
        IndexOutcome::Indexed { count } => println!(
            "{} Embedded {} documents and stored them in {}",
            style("✓").green(),
            count,
            style(collection).cyan()
        ),
        IndexOutcome::Rebuilt { count } => println!(
            "{} Collection {} was out of date and has been rebuilt with {} documents",
            style("✓").green(),
            style(collection).cyan(),
            count
        ),
        IndexOutcome::Skipped { count } => println!(
            "{} Collection {} already holds {} documents, nothing to do",
            style("•").dim(),
            style(collection).cyan(),
            count
        ),
    }
}

fn print_retrieved(retrieved: &[RetrievedDocument]) {
    println!("{}", style("📄 Retrieved context").bold());
    if retrieved.is_empty() {
        println!("   {}", style("(no documents retrieved)").dim());
    }
    for doc in retrieved {
        println!(
            "   {} {}",
            style(format!("[{} · distance {:.4}]", doc.id, doc.distance)).dim(),
            doc.text
        );
    }
}

fn print_prompt(prompt: &str) {
    println!("{}", style("🧾 Full prompt").bold());
    println!("{}", prompt);
}

fn print_rag_answer(rag: &RagAnswer, show_prompt: bool) {
    print_retrieved(&rag.retrieved);
    print_rule();
    if show_prompt {
        print_prompt(&rag.prompt);
        print_rule();
    }
    println!("{}", style("✅ Answer with RAG").green().bold());
    println!("{}", rag.answer);
}

fn print_comparison(comparison: &Comparison, show_prompt: bool) {
    println!("{}", style("❌ Answer without RAG").red().bold());
    println!(
        "{}",
        style("The model's direct answer, without any context").dim()
    );
    println!("{}", comparison.without_context);
    print_rule();

    print_rag_answer(&comparison.with_context, show_prompt);
    print_rule();

    println!("{}", style("💡 The difference between the answers").bold());
    println!(
        "   • {}: the model answers from its general knowledge only, which may be inaccurate or out of date",
        style("Without RAG").red()
    );
    println!(
        "   • {}: the model answers from the documents you provided, which is more accurate and reliable",
        style("With RAG").green()
    );
}

/// Index the built-in corpus or the documents in `documents`
#[inline]
pub async fn index_documents(config: &Config, documents: Option<&Path>, reset: bool) -> Result<()> {
    require_persistent(config, "index")?;

    let docs = match documents {
        Some(path) => load_documents(path)?,
        None => builtin_documents(),
    };
    info!("Indexing {} documents", docs.len());

    let mut pipeline = open_pipeline(config).await?;

    let bar = spinner(&format!("Embedding {} documents...", docs.len()));
    let outcome = if reset {
        pipeline.index_fresh(&docs).await
    } else {
        pipeline.index(&docs).await
    };
    bar.finish_and_clear();

    print_outcome(outcome?, &config.storage.collection);
    Ok(())
}

/// Index the documents an `ask` needs before answering
///
/// A documents file is always indexed. Memory storage starts empty on every run, so without a
/// file it gets the built-in corpus. A persistent collection is used as it is.
#[inline]
pub async fn prepare_collection<E, G, S>(
    pipeline: &mut RagPipeline<E, G, S>,
    config: &Config,
    documents: Option<&Path>,
) -> Result<Option<IndexOutcome>>
where
    E: Embedder,
    G: Generator,
    S: DocumentStore,
{
    let docs = match (documents, config.storage.mode) {
        (Some(path), _) => load_documents(path)?,
        (None, StorageMode::Memory) => {
            info!("Memory storage starts empty, indexing the built-in documents");
            builtin_documents()
        }
        (None, StorageMode::Persistent) => return Ok(None),
    };

    let bar = spinner(&format!("Embedding {} documents...", docs.len()));
    let outcome = pipeline.index(&docs).await;
    bar.finish_and_clear();

    let outcome = outcome?;
    print_outcome(outcome, &config.storage.collection);
    print_rule();
    Ok(Some(outcome))
}

/// Answer a question with retrieved context, optionally alongside the raw answer
#[inline]
pub async fn ask(
    config: &Config,
    question: &str,
    documents: Option<&Path>,
    compare: bool,
    show_prompt: bool,
) -> Result<()> {
    if question_or_warn(question)?.is_none() {
        return Ok(());
    }

    let mut pipeline = open_pipeline(config).await?;
    prepare_collection(&mut pipeline, config, documents).await?;
    answer(&pipeline, config, question, compare, show_prompt).await
}

async fn answer<E, G, S>(
    pipeline: &RagPipeline<E, G, S>,
    config: &Config,
    question: &str,
    compare: bool,
    show_prompt: bool,
) -> Result<()>
where
    E: Embedder,
    G: Generator,
    S: DocumentStore,
{
    let Some(question) = question_or_warn(question)? else {
        return Ok(());
    };

    if pipeline.store().count().await? == 0 {
        println!(
            "{} Collection {} is empty. Run 'rag-workshop index' first for grounded answers.",
            style("⚠️").yellow(),
            style(&config.storage.collection).cyan()
        );
    }

    println!("{} {}", style("❓ Question:").bold(), question);
    print_rule();

    if compare {
        let bar = spinner("Searching and generating both answers...");
        let comparison = pipeline.compare(question).await;
        bar.finish_and_clear();
        print_comparison(&comparison?, show_prompt);
    } else {
        let bar = spinner("Searching and generating...");
        let rag = pipeline.ask(question).await;
        bar.finish_and_clear();
        print_rag_answer(&rag?, show_prompt);
    }

    Ok(())
}

/// List the documents stored in the collection
#[inline]
pub async fn list_documents(config: &Config) -> Result<()> {
    require_persistent(config, "documents")?;

    let store = VectorStore::open(config)
        .await
        .context("Failed to open vector store")?;
    let documents = store.documents().await?;

    println!(
        "{} Stored documents: {}",
        style("📚").bold(),
        style(documents.len()).bold()
    );

    if documents.is_empty() {
        println!("Use 'rag-workshop index' to add the built-in documents.");
        return Ok(());
    }

    println!();
    for (i, stored) in documents.iter().enumerate() {
        println!(
            "{} {}",
            style(format!("Document {} ({})", i + 1, stored.document.id)).cyan(),
            style(format!("embedded with {}", stored.embedding_model)).dim()
        );
        println!("   {}", stored.document.text);
    }

    Ok(())
}

/// Show the collection, models and Gemini connectivity
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("{}", style("RAG Workshop Status").bold().underlined());
    println!();

    println!("🗄️  Storage:");
    println!("   Mode: {}", config.storage.mode);
    println!("   Path: {}", config.vector_database_path().display());
    println!("   Collection: {}", config.storage.collection);
    match VectorStore::open(config).await {
        Ok(store) => {
            match store.count().await {
                Ok(count) => println!("   ✅ Documents: {}", count),
                Err(e) => println!("   ❌ Failed to count documents - {}", e),
            }
            if let Some(dim) = store.vector_dimension() {
                println!("   Vector dimension: {}", dim);
            }
        }
        Err(e) => println!("   ❌ LanceDB: Failed to connect - {}", e),
    }

    println!();
    println!("🤖 Gemini:");
    println!("   Base URL: {}", config.gemini.base_url);
    println!("   Embedding model: {}", config.gemini.embedding_model);
    println!("   Generation model: {}", config.gemini.generation_model);
    println!("   Retrieval top_k: {}", config.retrieval.top_k);

    match gemini_client(config) {
        Ok(client) => {
            let bar = spinner("Checking Gemini...");
            let health = client.health_check();
            bar.finish_and_clear();
            match health {
                Ok(()) => println!("   ✅ API key accepted and models available"),
                Err(e) => println!("   ❌ Health check failed - {:#}", e),
            }
        }
        Err(e) => println!("   ❌ {}", e),
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'rag-workshop index' to embed the documents");
    println!("   • Use 'rag-workshop ask \"<question>\" --compare' to compare answers");

    Ok(())
}

/// Drop the collection
#[inline]
pub async fn reset_collection(config: &Config) -> Result<()> {
    require_persistent(config, "reset")?;

    let mut store = VectorStore::open(config)
        .await
        .context("Failed to open vector store")?;
    let count = store.count().await?;
    store.reset().await?;

    println!(
        "{} Collection {} reset ({} documents removed)",
        style("✓").green(),
        style(&config.storage.collection).cyan(),
        count
    );
    Ok(())
}

/// Index the built-in corpus from scratch and compare answers for one question
#[inline]
pub async fn run_demo(config: &Config, question: Option<&str>) -> Result<()> {
    let question = question.unwrap_or(DEFAULT_QUESTION);
    let mut pipeline = open_pipeline(config).await?;

    let documents = builtin_documents();
    let bar = spinner("Embedding the built-in documents...");
    let outcome = pipeline.index_fresh(&documents).await;
    bar.finish_and_clear();
    print_outcome(outcome?, &config.storage.collection);
    print_rule();

    answer(&pipeline, config, question, true, true).await
}
