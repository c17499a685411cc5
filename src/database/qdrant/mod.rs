// Qdrant vector index client
// Remote counterpart of the embedded LanceDB store

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    self, CountPointsBuilder, CreateCollectionBuilder, Distance, PointId, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use std::collections::HashMap;
use std::time::Duration;
use tonic::Code;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::index::{CollectionSpec, DistanceMetric, IndexPoint, ScoredPoint, VectorIndex};
use crate::identity::DocumentId;
use crate::{Result, SearchError};

const SCROLL_PAGE_SIZE: u32 = 256;

/// Connection settings for a Qdrant endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QdrantSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl QdrantSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config
            .index
            .endpoint
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| SearchError::Config("Qdrant backend requires an endpoint".to_string()))?;

        Ok(Self {
            url,
            api_key: config.index.api_key.clone(),
            timeout: config.service.index_timeout(),
        })
    }
}

/// Vector index backed by a Qdrant collection
pub struct QdrantIndex {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex").finish_non_exhaustive()
    }
}

/// Transient failures are worth retrying; bad credentials or a malformed
/// request will fail the same way next time.
fn classify(context: &str, err: QdrantError) -> SearchError {
    let message = format!("{context}: {err}");
    match &err {
        QdrantError::ResponseError { status } => match status.code() {
            Code::Unauthenticated | Code::PermissionDenied => SearchError::Config(message),
            Code::InvalidArgument
            | Code::FailedPrecondition
            | Code::OutOfRange
            | Code::Unimplemented
            | Code::NotFound
            | Code::AlreadyExists => SearchError::Database(message),
            _ => SearchError::DependencyUnavailable(message),
        },
        QdrantError::ResourceExhaustedError { .. } | QdrantError::Io(_) => {
            SearchError::DependencyUnavailable(message)
        }
        QdrantError::InvalidUri(_) => SearchError::Config(message),
        _ => SearchError::Database(message),
    }
}

fn is_already_exists(err: &QdrantError) -> bool {
    matches!(err, QdrantError::ResponseError { status } if status.code() == Code::AlreadyExists)
}

fn to_qdrant_distance(metric: DistanceMetric) -> Distance {
    match metric {
        DistanceMetric::Cosine => Distance::Cosine,
        DistanceMetric::Euclidean => Distance::Euclid,
        DistanceMetric::Dot => Distance::Dot,
    }
}

fn from_qdrant_distance(distance: Distance) -> Option<DistanceMetric> {
    match distance {
        Distance::Cosine => Some(DistanceMetric::Cosine),
        Distance::Euclid => Some(DistanceMetric::Euclidean),
        Distance::Dot => Some(DistanceMetric::Dot),
        _ => None,
    }
}

/// Qdrant only accepts UUIDs or integers as point ids. Ids that are not UUIDs
/// map to a name-based UUID; the original id travels in the payload.
/// Only the lowercase hyphenated form is used as-is, since Qdrant normalises
/// every other UUID spelling and would fold distinct ids into one point.
fn point_id_for(id: &DocumentId) -> PointId {
    let uuid = id
        .as_uuid()
        .filter(|uuid| uuid.hyphenated().to_string() == id.as_str())
        .unwrap_or_else(|| Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_str().as_bytes()));
    PointId::from(uuid.to_string())
}

fn payload_for(point: &IndexPoint) -> HashMap<String, QdrantValue> {
    let mut payload = HashMap::new();
    payload.insert(
        "id".to_string(),
        QdrantValue::from(point.payload.id.as_str().to_string()),
    );
    if let Some(title) = &point.payload.title {
        payload.insert("title".to_string(), QdrantValue::from(title.clone()));
    }
    payload
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(qdrant::value::Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn point_id_string(point_id: Option<&PointId>) -> Option<String> {
    match point_id.and_then(|p| p.point_id_options.as_ref()) {
        Some(qdrant::point_id::PointIdOptions::Uuid(uuid)) => Some(uuid.clone()),
        Some(qdrant::point_id::PointIdOptions::Num(num)) => Some(num.to_string()),
        None => None,
    }
}

/// Recovers the canonical id, preferring the payload over the point id.
fn document_id_of(
    payload: &HashMap<String, QdrantValue>,
    point_id: Option<&PointId>,
) -> Result<DocumentId> {
    let raw = payload_string(payload, "id")
        .or_else(|| point_id_string(point_id))
        .ok_or_else(|| SearchError::Database("Point has no id".to_string()))?;
    DocumentId::parse(&raw)
}

/// Qdrant reports Euclidean distance directly; flip it so higher is more similar.
fn normalize_score(metric: DistanceMetric, raw: f32) -> f32 {
    match metric {
        DistanceMetric::Euclidean => -raw,
        DistanceMetric::Cosine | DistanceMetric::Dot => raw,
    }
}

fn extract_config_params(info: &qdrant::CollectionInfo) -> Option<(usize, Option<DistanceMetric>)> {
    let vectors = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match vectors.config.as_ref()? {
        qdrant::vectors_config::Config::Params(p) => {
            Some((p.size as usize, from_qdrant_distance(p.distance())))
        }
        qdrant::vectors_config::Config::ParamsMap(map) => map
            .map
            .values()
            .next()
            .map(|p| (p.size as usize, from_qdrant_distance(p.distance()))),
    }
}

impl QdrantIndex {
    #[inline]
    pub fn connect(settings: &QdrantSettings) -> Result<Self> {
        let mut builder = Qdrant::from_url(&settings.url);

        if let Some(api_key) = &settings.api_key {
            builder = builder.api_key(api_key.clone());
        }

        builder = builder.timeout(settings.timeout);

        let client = builder
            .build()
            .map_err(|e| SearchError::Config(format!("Failed to build Qdrant client: {e}")))?;

        info!("Qdrant client configured for {}", settings.url);
        Ok(Self { client })
    }

    async fn create(&self, spec: &CollectionSpec) -> Result<()> {
        let builder = CreateCollectionBuilder::new(&spec.name).vectors_config(
            VectorParamsBuilder::new(spec.dimension as u64, to_qdrant_distance(spec.metric)),
        );
        match self.client.create_collection(builder).await {
            Ok(_) => {
                info!(
                    "Created collection '{}' with {} dimensions ({})",
                    spec.name, spec.dimension, spec.metric
                );
                Ok(())
            }
            // Another writer created it first
            Err(e) if is_already_exists(&e) => {
                debug!("Collection '{}' appeared concurrently", spec.name);
                self.verify(spec).await
            }
            Err(e) => Err(classify("Failed to create collection", e)),
        }
    }

    async fn verify(&self, spec: &CollectionSpec) -> Result<()> {
        let info = self
            .client
            .collection_info(&spec.name)
            .await
            .map_err(|e| classify("Failed to read collection info", e))?
            .result
            .ok_or_else(|| SearchError::Database("Collection info missing result".to_string()))?;

        let (dimension, metric) = extract_config_params(&info).ok_or_else(|| {
            SearchError::SchemaConflict(format!(
                "Collection '{}' has no single vector configuration",
                spec.name
            ))
        })?;
        debug!("Collection '{}' exists, verifying shape", spec.name);
        spec.check_existing(dimension, metric)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    #[inline]
    fn backend_name(&self) -> &'static str {
        "qdrant"
    }

    #[inline]
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()> {
        if self.collection_exists(&spec.name).await? {
            self.verify(spec).await
        } else {
            self.create(spec).await
        }
    }

    #[inline]
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| classify("Failed to check collection", e))
    }

    #[inline]
    async fn recreate_collection(&self, spec: &CollectionSpec) -> Result<()> {
        if self.collection_exists(&spec.name).await? {
            warn!("Deleting collection '{}' and all of its points", spec.name);
            self.client
                .delete_collection(&spec.name)
                .await
                .map_err(|e| classify("Failed to delete collection", e))?;
        }
        self.create(spec).await
    }

    #[inline]
    async fn upsert(&self, spec: &CollectionSpec, points: Vec<IndexPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        for point in &points {
            spec.check_vector(&point.vector)?;
        }

        let count = points.len();
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                let payload = payload_for(&point);
                PointStruct::new(point_id_for(&point.id), point.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&spec.name, points).wait(true))
            .await
            .map_err(|e| classify("Failed to upsert points", e))?;

        debug!("Upserted {} points into '{}'", count, spec.name);
        Ok(())
    }

    #[inline]
    async fn query(
        &self,
        spec: &CollectionSpec,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        spec.check_vector(vector)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&spec.name, vector.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| classify("Failed to search points", e))?;

        response
            .result
            .into_iter()
            .take(limit)
            .map(|point| {
                Ok(ScoredPoint {
                    id: document_id_of(&point.payload, point.id.as_ref())?,
                    score: normalize_score(spec.metric, point.score),
                    title: payload_string(&point.payload, "title"),
                })
            })
            .collect()
    }

    #[inline]
    async fn count(&self, spec: &CollectionSpec) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&spec.name).exact(true))
            .await
            .map_err(|e| classify("Failed to count points", e))?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    #[inline]
    async fn list_ids(&self, spec: &CollectionSpec) -> Result<Vec<DocumentId>> {
        let mut ids = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&spec.name)
                .limit(SCROLL_PAGE_SIZE)
                .with_payload(true);
            if let Some(offset) = offset.take() {
                builder = builder.offset(offset);
            }

            let page = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| classify("Failed to scroll points", e))?;

            for point in &page.result {
                ids.push(document_id_of(&point.payload, point.id.as_ref())?);
            }

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }
}
