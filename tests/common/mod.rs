// Shared fixtures for the integration tests
#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use post_search::Result;
use post_search::database::index::{CollectionSpec, DistanceMetric, VectorIndex};
use post_search::database::lancedb::VectorStore;
use post_search::database::sqlite::Database;
use post_search::embeddings::Embedder;
use post_search::service::{IndexingService, ResourceFactory, ServiceSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub const DIMENSION: usize = 384;

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| {
            let t = t.to_lowercase();
            match t.strip_suffix('s') {
                Some(stem) if stem.len() > 3 => stem.to_string(),
                _ => t,
            }
        })
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Deterministic bag-of-words vector: one hashed bucket per token plus a bias
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0_f32; dimension];
    vector[0] = 0.1;
    for token in tokens(text) {
        let bucket = 1 + (fnv1a(&token) as usize) % (dimension - 1);
        vector[bucket] += 1.0;
    }
    vector
}

pub struct HashEmbedder {
    pub dimension: usize,
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        "hash-test"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_embedding(text, self.dimension))
    }
}

/// Hash embeddings over a real LanceDB directory, counting start-ups
pub struct LanceFactory {
    pub path: PathBuf,
    pub dimension: usize,
    pub starts: AtomicUsize,
}

#[async_trait]
impl ResourceFactory for LanceFactory {
    async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Arc::new(HashEmbedder {
            dimension: self.dimension,
        }))
    }

    async fn index(&self) -> Result<Arc<dyn VectorIndex>> {
        Ok(Arc::new(VectorStore::open(&self.path).await?))
    }
}

pub fn settings(dimension: usize) -> ServiceSettings {
    ServiceSettings {
        collection: CollectionSpec {
            name: "posts".to_string(),
            dimension,
            metric: DistanceMetric::Cosine,
        },
        max_workers: 4,
        embed_timeout: Duration::from_secs(10),
        index_timeout: Duration::from_secs(30),
    }
}

pub fn lance_factory(temp_dir: &TempDir, dimension: usize) -> Arc<LanceFactory> {
    Arc::new(LanceFactory {
        path: temp_dir.path().join("vectors"),
        dimension,
        starts: AtomicUsize::new(0),
    })
}

/// Service over LanceDB in `temp_dir` with 384-dimension hash embeddings
pub fn lance_service(temp_dir: &TempDir) -> (IndexingService, Arc<LanceFactory>) {
    let factory = lance_factory(temp_dir, DIMENSION);
    let service = IndexingService::new(
        settings(DIMENSION),
        Arc::clone(&factory) as Arc<dyn ResourceFactory>,
    );
    (service, factory)
}

pub async fn database(temp_dir: &TempDir) -> Database {
    Database::new(temp_dir.path().join("posts.db"))
        .await
        .expect("should open database")
}

pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}
