#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// End-to-end tests: Gemini REST API mocked with wiremock, real LanceDB on disk
use rag_workshop::RagError;
use rag_workshop::commands::{index_documents, open_pipeline, prepare_collection};
use rag_workshop::config::{Config, GeminiConfig, StorageMode};
use rag_workshop::corpus::{DEFAULT_QUESTION, builtin_documents};
use rag_workshop::database::{DocumentStore, VectorStore};
use rag_workshop::gemini::GeminiClient;
use rag_workshop::generation::NOT_FOUND_PHRASE;
use rag_workshop::rag::{IndexOutcome, RagPipeline};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const EMBED_PATH: &str = "/v1beta/models/gemini-embedding-001:embedContent";
const BATCH_EMBED_PATH: &str = "/v1beta/models/gemini-embedding-001:batchEmbedContents";
const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash-lite:generateContent";

const KEYWORDS: [&str; 5] = ["تأسست", "التنفيذي", "أرباح", "برو", "دبي"];

fn keyword_vector(text: &str) -> Vec<f32> {
    let mut vector: Vec<f32> = KEYWORDS
        .iter()
        .map(|keyword| if text.contains(keyword) { 1.0 } else { 0.0 })
        .collect();
    vector.push(0.1);
    vector
}

fn first_text(content: &Value) -> String {
    content["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

fn request_json(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap_or(Value::Null)
}

fn embed_responder(request: &Request) -> ResponseTemplate {
    let body = request_json(request);
    let text = first_text(&body["content"]);
    ResponseTemplate::new(200).set_body_json(json!({
        "embedding": { "values": keyword_vector(&text) }
    }))
}

fn batch_embed_responder(request: &Request) -> ResponseTemplate {
    let body = request_json(request);
    let embeddings: Vec<Value> = body["requests"]
        .as_array()
        .map(|requests| {
            requests
                .iter()
                .map(|r| json!({ "values": keyword_vector(&first_text(&r["content"])) }))
                .collect()
        })
        .unwrap_or_default();
    ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
}

/// Answers only with facts found in the prompt's context block
fn generate_responder(request: &Request) -> ResponseTemplate {
    let body = request_json(request);
    let prompt = first_text(&body["contents"][0]);

    let answer = if !prompt.contains("السياق:") {
        "لا تتوفر لدي معلومات عن هذه الشركة.".to_string()
    } else if prompt.contains("في عام 2000") && prompt.contains("أحمد السلمان") {
        "تأسست شركة النور في عام 2000، ورئيسها التنفيذي هو أحمد السلمان.".to_string()
    } else {
        NOT_FOUND_PHRASE.to_string()
    };

    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": answer }] },
            "finishReason": "STOP"
        }]
    }))
}

async fn start_gemini_mock() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(embed_responder)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(BATCH_EMBED_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(batch_embed_responder)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(generate_responder)
        .mount(&server)
        .await;
    server
}

fn test_config(server: &MockServer, temp_dir: &TempDir) -> Config {
    Config {
        base_dir: temp_dir.path().to_path_buf(),
        gemini: GeminiConfig {
            base_url: format!("{}/v1beta", server.uri()),
            ..GeminiConfig::default()
        },
        ..Config::default()
    }
}

async fn pipeline_for(
    config: &Config,
) -> RagPipeline<GeminiClient, GeminiClient, VectorStore> {
    let client =
        GeminiClient::new(&config.gemini, "test-key".to_string()).expect("should create client");
    let store = VectorStore::open(config).await.expect("should open store");
    RagPipeline::new(client.clone(), client, store).with_top_k(config.retrieval.top_k)
}

async fn received_on(server: &MockServer, endpoint: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == endpoint)
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn demo_scenario_end_to_end() {
    let server = start_gemini_mock().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&server, &temp_dir);
    let mut pipeline = pipeline_for(&config).await;

    let outcome = pipeline
        .index_fresh(&builtin_documents())
        .await
        .expect("should index");
    assert_eq!(outcome, IndexOutcome::Indexed { count: 4 });
    assert_eq!(received_on(&server, BATCH_EMBED_PATH).await, 1);

    let comparison = pipeline
        .compare(DEFAULT_QUESTION)
        .await
        .expect("should compare");

    let ids: Vec<&str> = comparison
        .with_context
        .retrieved
        .iter()
        .map(|d| d.id.as_str())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&"doc_1"));
    assert!(ids.contains(&"doc_3"));

    let distances: Vec<f32> = comparison
        .with_context
        .retrieved
        .iter()
        .map(|d| d.distance)
        .collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));

    assert!(comparison.with_context.answer.contains("2000"));
    assert!(comparison.with_context.answer.contains("أحمد السلمان"));
    assert!(!comparison.without_context.contains("أحمد السلمان"));

    assert_eq!(received_on(&server, EMBED_PATH).await, 1);
    assert_eq!(received_on(&server, GENERATE_PATH).await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reindexing_does_not_call_embedding_api() {
    let server = start_gemini_mock().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&server, &temp_dir);
    let documents = builtin_documents();

    {
        let mut pipeline = pipeline_for(&config).await;
        pipeline.index(&documents).await.expect("should index");
    }

    let mut pipeline = pipeline_for(&config).await;
    let outcome = pipeline.index(&documents).await.expect("should re-index");

    assert_eq!(outcome, IndexOutcome::Skipped { count: 4 });
    assert_eq!(pipeline.store().count().await.expect("should count"), 4);
    assert_eq!(received_on(&server, BATCH_EMBED_PATH).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_question_never_reaches_gemini() {
    let server = start_gemini_mock().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&server, &temp_dir);
    let pipeline = pipeline_for(&config).await;

    let result = pipeline.compare("   ").await;

    assert!(matches!(result, Err(RagError::EmptyQuestion)));
    assert!(
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn irrelevant_question_gets_fallback_answer() {
    let server = start_gemini_mock().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(&server, &temp_dir);
    let mut pipeline = pipeline_for(&config).await;

    let profit_reports: Vec<_> = builtin_documents()
        .into_iter()
        .filter(|d| d.text.contains("أرباح"))
        .collect();
    pipeline
        .index(&profit_reports)
        .await
        .expect("should index");

    let rag = pipeline
        .ask("ما هي عاصمة فرنسا؟")
        .await
        .expect("should answer");

    assert_eq!(rag.retrieved.len(), 2);
    assert_eq!(rag.answer, NOT_FOUND_PHRASE);
    assert_eq!(received_on(&server, GENERATE_PATH).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn memory_storage_is_not_persisted() {
    let server = start_gemini_mock().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = test_config(&server, &temp_dir);
    config.storage.mode = StorageMode::Memory;

    {
        let mut pipeline = pipeline_for(&config).await;
        pipeline
            .index(&builtin_documents())
            .await
            .expect("should index");
        assert_eq!(pipeline.store().count().await.expect("should count"), 4);
    }

    assert!(!config.vector_database_path().exists());
    let pipeline = pipeline_for(&config).await;
    assert_eq!(pipeline.store().count().await.expect("should count"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn memory_storage_ask_indexes_before_answering() {
    let server = start_gemini_mock().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = test_config(&server, &temp_dir);
    config.storage.mode = StorageMode::Memory;

    let mut pipeline = pipeline_for(&config).await;
    let outcome = prepare_collection(&mut pipeline, &config, None)
        .await
        .expect("should index the built-in documents");
    assert_eq!(outcome, Some(IndexOutcome::Indexed { count: 4 }));

    let rag = pipeline
        .ask(DEFAULT_QUESTION)
        .await
        .expect("should answer");
    assert!(rag.answer.contains("2000"));
    assert!(rag.answer.contains("أحمد السلمان"));
    assert_eq!(received_on(&server, BATCH_EMBED_PATH).await, 1);
    assert!(!config.vector_database_path().exists());
}

#[tokio::test]
async fn index_command_rejects_memory_storage() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.storage.mode = StorageMode::Memory;
    config.gemini.api_key_env = "RAG_WORKSHOP_TEST_KEY_THAT_IS_NEVER_SET".to_string();

    let err = index_documents(&config, None, false)
        .await
        .err()
        .expect("should refuse memory storage");

    assert!(err.to_string().contains("memory storage"));
    assert!(!err.to_string().contains("RAG_WORKSHOP_TEST_KEY_THAT_IS_NEVER_SET"));
}

#[tokio::test]
async fn missing_api_key_fails_before_any_work() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.gemini.api_key_env = "RAG_WORKSHOP_TEST_KEY_THAT_IS_NEVER_SET".to_string();

    let err = open_pipeline(&config)
        .await
        .err()
        .expect("should fail without an API key");

    assert!(
        err.to_string()
            .contains("RAG_WORKSHOP_TEST_KEY_THAT_IS_NEVER_SET")
    );
    assert!(!config.vector_database_path().exists());
}

#[tokio::test]
#[ignore = "requires GEMINI_API_KEY and network access to the Gemini API"]
async fn live_gemini_demo_scenario() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };

    let mut pipeline = open_pipeline(&config)
        .await
        .expect("GEMINI_API_KEY should be set");
    pipeline
        .index_fresh(&builtin_documents())
        .await
        .expect("should index");

    let comparison = pipeline
        .compare(DEFAULT_QUESTION)
        .await
        .expect("should compare");

    assert!(comparison.with_context.answer.contains("2000"));
    assert!(!comparison.without_context.is_empty());
}
