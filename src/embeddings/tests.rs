use super::*;
use crate::config::GeminiConfig;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct EmptyEmbedder;

impl Embedder for EmptyEmbedder {
    fn model(&self) -> &str {
        "empty"
    }

    fn embed(&self, _texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(Vec::new())
    }
}

#[test]
fn embed_one_reports_missing_vector() {
    let result = EmptyEmbedder.embed_one("anything");
    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn gemini_embedder_maps_failures_to_embedding_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-embedding-001:embedContent"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let config = GeminiConfig {
        base_url: format!("{}/v1beta/", server.uri()),
        ..GeminiConfig::default()
    };
    let client = GeminiClient::new(&config, "bad-key".to_string()).expect("should build client");

    let result = tokio::task::spawn_blocking(move || client.embed_one("question"))
        .await
        .expect("task should not panic");

    match result {
        Err(RagError::Embedding(message)) => assert!(message.contains("401")),
        other => panic!("expected embedding error, got {:?}", other),
    }
}

#[tokio::test]
async fn gemini_embedder_is_deterministic_for_repeated_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-embedding-001:embedContent"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embedding": { "values": [0.25, -0.5] } })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let config = GeminiConfig {
        base_url: format!("{}/v1beta/", server.uri()),
        ..GeminiConfig::default()
    };
    let client = GeminiClient::new(&config, "key".to_string()).expect("should build client");

    let (first, second) = tokio::task::spawn_blocking(move || {
        (client.embed_one("same text"), client.embed_one("same text"))
    })
    .await
    .expect("task should not panic");

    let first = first.expect("first embedding");
    let second = second.expect("second embedding");
    assert_eq!(first, second);
}

#[test]
fn gemini_embedder_reports_configured_model() {
    let client =
        GeminiClient::new(&GeminiConfig::default(), String::new()).expect("should build client");
    assert_eq!(Embedder::model(&client), "gemini-embedding-001");
}
