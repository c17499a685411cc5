#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Drives the production wiring (Ollama client plus LanceDB) against a mock
// Ollama server. The tests marked ignored need a local Ollama instance:
// cargo test --test integration_ollama -- --ignored

mod common;

use common::{DIMENSION, hash_embedding, init_test_tracing};
use post_search::SearchError;
use post_search::config::{Config, OllamaConfig};
use post_search::embeddings::{Embedder, OllamaClient};
use post_search::service::{IndexingService, SearchHit};
use serde_json::{Value, json};
use std::env;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const MODEL: &str = "all-minilm";

/// Answers `/api/embed` with hash embeddings of the posted input
struct EmbedResponder;

impl Respond for EmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("request is json");
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .expect("input is an array")
            .iter()
            .map(|text| hash_embedding(text.as_str().expect("input is text"), DIMENSION))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "model": MODEL,
            "embeddings": embeddings
        }))
    }
}

async fn mock_ollama() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "0.6.0" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "all-minilm:latest", "size": 45_960_996 }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EmbedResponder)
        .mount(&server)
        .await;
    server
}

fn config_for(server: &MockServer, temp_dir: &TempDir) -> Config {
    let url = Url::parse(&server.uri()).expect("mock server uri parses");
    let mut config = Config {
        ollama: OllamaConfig {
            protocol: url.scheme().to_string(),
            host: url.host_str().expect("mock server has host").to_string(),
            port: url.port().expect("mock server has port"),
            model: MODEL.to_string(),
            embedding_dimension: DIMENSION as u32,
        },
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.service.embed_timeout_secs = 5;
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_service_indexes_and_searches() {
    init_test_tracing();
    let server = mock_ollama().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let service = IndexingService::from_config(&config_for(&server, &temp_dir));

    assert!(!service.is_initialized());
    service
        .index_document("id1", "Intro to caches", "LRU and eviction")
        .await
        .expect("id1 indexed");
    assert!(service.is_initialized());
    service
        .index_document(
            "id2",
            "Load balancing basics",
            "round robin and least-connections",
        )
        .await
        .expect("id2 indexed");
    service
        .index_document("id3", "Consensus protocols", "Raft and Paxos overview")
        .await
        .expect("id3 indexed");

    let hits: Vec<SearchHit> = service
        .search("cache eviction strategies", 2)
        .await
        .expect("search succeeds")
        .collect();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id.as_str(), "id1");

    assert!(temp_dir.path().join("vectors").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_model_fails_initialization() {
    let server = mock_ollama().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = config_for(&server, &temp_dir);
    config.ollama.model = "nomic-embed-text".to_string();

    let service = IndexingService::from_config(&config);
    let result = service.search("anything", 3).await;

    assert!(
        matches!(result, Err(SearchError::Config(_))),
        "unexpected result: {result:?}"
    );
    assert!(!service.is_initialized());
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_ollama_is_retryable() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = config_for(&server, &temp_dir);
    drop(server);

    let service = IndexingService::from_config(&config);
    let error = service
        .index_document("a", "Title", "Body")
        .await
        .expect_err("nothing is listening");

    assert!(error.is_retryable(), "unexpected error: {error}");
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_width_mismatch_is_rejected() {
    let server = mock_ollama().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = config_for(&server, &temp_dir);
    config.ollama.embedding_dimension = 768;

    let client = OllamaClient::new(&config).expect("client builds");
    let result = client.embed("text").await;
    assert!(matches!(result, Err(SearchError::SchemaConflict(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn model_width_is_checked_at_start_up() {
    let server = mock_ollama().await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = config_for(&server, &temp_dir);
    config.ollama.embedding_dimension = 768;

    let service = IndexingService::from_config(&config);
    let result = service.search("anything", 3).await;

    assert!(
        matches!(result, Err(SearchError::SchemaConflict(_))),
        "unexpected result: {result:?}"
    );
    assert!(!service.is_initialized());
    assert!(!temp_dir.path().join("vectors").exists());
}

fn live_config() -> Config {
    let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(11434);
    let mut config = Config::default();
    config.ollama.host = host;
    config.ollama.port = port;
    config
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a local Ollama instance with all-minilm pulled"]
async fn real_ollama_health_and_embedding() {
    init_test_tracing();
    let client = OllamaClient::new(&live_config())
        .expect("client builds")
        .with_timeout(Duration::from_secs(60));

    client.health_check().await.expect("Ollama is healthy");

    let first = client.embed("Intro to caches. LRU and eviction").await.expect("embeds");
    let second = client.embed("Intro to caches. LRU and eviction").await.expect("embeds");
    assert_eq!(first.len(), DIMENSION);
    for (a, b) in first.iter().zip(&second) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a local Ollama instance with all-minilm pulled"]
async fn real_ollama_cache_scenario() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = live_config();
    config.base_dir = temp_dir.path().to_path_buf();
    let service = IndexingService::from_config(&config);

    for (id, title, description) in [
        ("id1", "Intro to caches", "LRU and eviction"),
        ("id2", "Load balancing basics", "round robin and least-connections"),
        ("id3", "Consensus protocols", "Raft and Paxos overview"),
    ] {
        service
            .index_document(id, title, description)
            .await
            .expect("indexed");
    }

    let hits: Vec<SearchHit> = service
        .search("cache eviction strategies", 2)
        .await
        .expect("search succeeds")
        .collect();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id.as_str(), "id1");
}
