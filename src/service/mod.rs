//! Embedding-indexing service: the only writer and reader of the vector index.
//!
//! Backends are created lazily on the first call that needs them and reused for
//! the lifetime of the service. A failed start-up is not cached, so the next
//! call tries again.


use async_trait::async_trait;
use std::future::Future;
use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};

use crate::config::{Config, IndexBackend};
use crate::database::index::{CollectionSpec, IndexPoint, ScoredPoint, VectorIndex};
use crate::database::lancedb::VectorStore;
use crate::database::qdrant::{QdrantIndex, QdrantSettings};
use crate::embeddings::{Embedder, OllamaClient, compose_document_text};
use crate::identity::DocumentId;
use crate::{Result, SearchError};

/// A post as seen by the index: its id and the text fields that get embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub description: String,
}

/// Knobs the service needs from the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub collection: CollectionSpec,
    pub max_workers: usize,
    pub embed_timeout: Duration,
    pub index_timeout: Duration,
}

impl ServiceSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.collection_spec(),
            max_workers: config.service.max_workers.max(1),
            embed_timeout: config.service.embed_timeout(),
            index_timeout: config.service.index_timeout(),
        }
    }
}

/// Builds the embedder and index on first use.
#[async_trait]
pub trait ResourceFactory: Send + Sync {
    async fn embedder(&self) -> Result<Arc<dyn Embedder>>;

    async fn index(&self) -> Result<Arc<dyn VectorIndex>>;
}

/// Production factory: Ollama embeddings plus the configured index backend
#[derive(Debug, Clone)]
pub struct ConfiguredResources {
    config: Config,
}

impl ConfiguredResources {
    #[inline]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ResourceFactory for ConfiguredResources {
    #[inline]
    async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let client =
            OllamaClient::new(&self.config)?.with_timeout(self.config.service.embed_timeout());
        Ok(Arc::new(client))
    }

    #[inline]
    async fn index(&self) -> Result<Arc<dyn VectorIndex>> {
        match self.config.index.backend {
            IndexBackend::LanceDb => Ok(Arc::new(VectorStore::new(&self.config).await?)),
            IndexBackend::Qdrant => {
                let settings = QdrantSettings::from_config(&self.config)?;
                Ok(Arc::new(QdrantIndex::connect(&settings)?))
            }
        }
    }
}

struct Resources {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: DocumentId,
    /// Similarity, higher is closer
    pub score: f32,
    pub title: Option<String>,
}

impl SearchHit {
    /// Score rounded to four decimals for display.
    #[inline]
    pub fn rounded_score(&self) -> f64 {
        (f64::from(self.score) * 10_000.0).round() / 10_000.0
    }
}

impl From<ScoredPoint> for SearchHit {
    #[inline]
    fn from(point: ScoredPoint) -> Self {
        Self {
            id: point.id,
            score: point.score,
            title: point.title,
        }
    }
}

/// Search results in descending score order. Consumed once.
#[derive(Debug)]
pub struct SearchHits {
    inner: std::vec::IntoIter<SearchHit>,
}

impl SearchHits {
    fn ranked(mut hits: Vec<SearchHit>, limit: usize) -> Self {
        // Stable, so equal scores keep the order the index returned them in.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Self {
            inner: hits.into_iter(),
        }
    }
}

impl Iterator for SearchHits {
    type Item = SearchHit;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for SearchHits {}

impl FusedIterator for SearchHits {}

async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        warn!("{} timed out after {:?}", what, limit);
        SearchError::DependencyUnavailable(format!("{what} timed out after {limit:?}"))
    })?
}

pub struct IndexingService {
    settings: ServiceSettings,
    factory: Arc<dyn ResourceFactory>,
    resources: OnceCell<Resources>,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for IndexingService {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingService")
            .field("settings", &self.settings)
            .field("initialized", &self.resources.initialized())
            .finish_non_exhaustive()
    }
}

impl IndexingService {
    #[inline]
    pub fn new(settings: ServiceSettings, factory: Arc<dyn ResourceFactory>) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_workers.max(1)));
        Self {
            settings,
            factory,
            resources: OnceCell::new(),
            permits,
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ServiceSettings::from_config(config),
            Arc::new(ConfiguredResources::new(config.clone())),
        )
    }

    #[inline]
    pub fn collection(&self) -> &CollectionSpec {
        &self.settings.collection
    }

    #[inline]
    pub fn max_workers(&self) -> usize {
        self.settings.max_workers
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.resources.initialized()
    }

    async fn resources(&self) -> Result<&Resources> {
        self.resources.get_or_try_init(|| self.initialize()).await
    }

    async fn initialize(&self) -> Result<Resources> {
        let collection = &self.settings.collection;
        info!(
            "Initializing indexing service for collection '{}'",
            collection.name
        );

        let embedder = bounded(
            self.settings.embed_timeout,
            "Embedding model start-up",
            async {
                let embedder = self.factory.embedder().await?;
                embedder.health_check().await?;
                Ok(embedder)
            },
        )
        .await?;

        if embedder.dimension() != collection.dimension {
            return Err(SearchError::SchemaConflict(format!(
                "Model {} produces {} dimensions but collection '{}' expects {}",
                embedder.model_id(),
                embedder.dimension(),
                collection.name,
                collection.dimension
            )));
        }

        let index = bounded(self.settings.index_timeout, "Vector index connection", async {
            let index = self.factory.index().await?;
            index.ensure_collection(collection).await?;
            Ok(index)
        })
        .await?;

        info!(
            "Indexing service ready: model {} ({} dims), {} collection '{}'",
            embedder.model_id(),
            embedder.dimension(),
            index.backend_name(),
            collection.name
        );
        Ok(Resources { embedder, index })
    }

    async fn embed(&self, resources: &Resources, text: &str) -> Result<Vec<f32>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SearchError::Other(anyhow::anyhow!("Embedding pool closed: {e}")))?;

        let vector = bounded(
            self.settings.embed_timeout,
            "Embedding",
            resources.embedder.embed(text),
        )
        .await?;

        self.settings.collection.check_vector(&vector)?;
        Ok(vector)
    }

    /// Embeds `"{title}. {description}"` and upserts it under `id`.
    ///
    /// Indexing the same id again replaces the previous entry. A failure after
    /// the embedding succeeded is reported as [`SearchError::NotIndexed`].
    #[inline]
    pub async fn index_document(
        &self,
        id: &str,
        title: &str,
        description: &str,
    ) -> Result<DocumentId> {
        let id = DocumentId::parse(id)?;
        self.write(id, title, description).await
    }

    /// Re-runs indexing for a post that is already stored
    #[inline]
    pub async fn reindex(&self, document: &Document) -> Result<DocumentId> {
        self.write(document.id.clone(), &document.title, &document.description)
            .await
    }

    async fn write(&self, id: DocumentId, title: &str, description: &str) -> Result<DocumentId> {
        let resources = self.resources().await?;
        debug!("Indexing post {}", id);

        let text = compose_document_text(title, description);
        let vector = self.embed(resources, &text).await?;

        let point = IndexPoint::new(id.clone(), vector, Some(title.to_string()));
        let upserted = bounded(
            self.settings.index_timeout,
            "Vector upsert",
            resources.index.upsert(&self.settings.collection, vec![point]),
        )
        .await;

        if let Err(cause) = upserted {
            warn!("Post {} was not indexed: {}", id, cause);
            return Err(SearchError::NotIndexed {
                id: id.to_string(),
                cause: Box::new(cause),
            });
        }

        debug!("Indexed post {}", id);
        Ok(id)
    }

    /// Returns up to `limit` posts closest to `query`, best first.
    #[inline]
    pub async fn search(&self, query: &str, limit: usize) -> Result<SearchHits> {
        if query.trim().is_empty() {
            return Err(SearchError::Validation(
                "Search query must not be empty".to_string(),
            ));
        }
        if limit == 0 {
            return Err(SearchError::Validation(
                "Search limit must be at least 1".to_string(),
            ));
        }

        let resources = self.resources().await?;
        debug!("Searching for {:?} (limit {})", query, limit);

        let vector = self.embed(resources, query).await?;
        let points = bounded(
            self.settings.index_timeout,
            "Vector query",
            resources.index.query(&self.settings.collection, &vector, limit),
        )
        .await?;

        let hits = SearchHits::ranked(points.into_iter().map(SearchHit::from).collect(), limit);
        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Number of entries in the collection
    #[inline]
    pub async fn indexed_count(&self) -> Result<u64> {
        let resources = self.resources().await?;
        bounded(
            self.settings.index_timeout,
            "Vector count",
            resources.index.count(&self.settings.collection),
        )
        .await
    }

    /// Entry count for status reports. Unlike [`Self::indexed_count`] this
    /// neither starts the embedder nor creates the collection; `None` means the
    /// collection does not exist yet.
    #[inline]
    pub async fn existing_count(&self) -> Result<Option<u64>> {
        let collection = &self.settings.collection;
        let index = match self.resources.get() {
            Some(resources) => Arc::clone(&resources.index),
            None => {
                bounded(
                    self.settings.index_timeout,
                    "Vector index connection",
                    self.factory.index(),
                )
                .await?
            }
        };

        let exists = bounded(
            self.settings.index_timeout,
            "Collection lookup",
            index.collection_exists(&collection.name),
        )
        .await?;
        if !exists {
            return Ok(None);
        }

        bounded(
            self.settings.index_timeout,
            "Vector count",
            index.count(collection),
        )
        .await
        .map(Some)
    }

    #[inline]
    pub async fn indexed_ids(&self) -> Result<Vec<DocumentId>> {
        let resources = self.resources().await?;
        bounded(
            self.settings.index_timeout,
            "Vector id scan",
            resources.index.list_ids(&self.settings.collection),
        )
        .await
    }

    /// Drops every entry in the collection. Only the bulk loader resets.
    pub(crate) async fn recreate_collection(&self) -> Result<()> {
        let resources = self.resources().await?;
        warn!(
            "Recreating collection '{}'",
            self.settings.collection.name
        );
        bounded(
            self.settings.index_timeout,
            "Collection reset",
            resources.index.recreate_collection(&self.settings.collection),
        )
        .await
    }
}
