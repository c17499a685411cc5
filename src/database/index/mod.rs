// Vector index abstraction
// Shared by the embedded LanceDB store and the remote Qdrant client


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::DocumentId;
use crate::{Result, SearchError};

/// Similarity metric a collection is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
    Dot,
}

impl DistanceMetric {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::Dot => "dot",
        }
    }

    /// Converts a backend distance into a score where higher means more similar.
    #[inline]
    pub fn score_from_distance(self, distance: f32) -> f32 {
        match self {
            Self::Cosine | Self::Dot => 1.0 - distance,
            Self::Euclidean => -distance,
        }
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = SearchError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "euclid" | "l2" => Ok(Self::Euclidean),
            "dot" => Ok(Self::Dot),
            other => Err(SearchError::Config(format!(
                "Unknown distance metric: {other}"
            ))),
        }
    }
}

/// Name, vector width and metric of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

impl CollectionSpec {
    /// Rejects a vector whose length differs from the collection dimension.
    #[inline]
    pub fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(SearchError::SchemaConflict(format!(
                "Vector has {} dimensions but collection '{}' expects {}",
                vector.len(),
                self.name,
                self.dimension
            )));
        }
        Ok(())
    }

    /// Compares an existing collection's shape against this spec.
    #[inline]
    pub fn check_existing(&self, dimension: usize, metric: Option<DistanceMetric>) -> Result<()> {
        if dimension != self.dimension {
            return Err(SearchError::SchemaConflict(format!(
                "Collection '{}' has dimension {dimension}, configured dimension is {}",
                self.name, self.dimension
            )));
        }
        if let Some(metric) = metric
            && metric != self.metric
        {
            return Err(SearchError::SchemaConflict(format!(
                "Collection '{}' uses {metric} distance, configured metric is {}",
                self.name, self.metric
            )));
        }
        Ok(())
    }
}

/// Metadata stored next to each vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPayload {
    pub id: DocumentId,
    pub title: Option<String>,
}

/// One entry to upsert
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPoint {
    pub id: DocumentId,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl IndexPoint {
    #[inline]
    pub fn new(id: DocumentId, vector: Vec<f32>, title: Option<String>) -> Self {
        let payload = PointPayload {
            id: id.clone(),
            title,
        };
        Self {
            id,
            vector,
            payload,
        }
    }
}

/// One nearest-neighbour hit, higher score is more similar
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: DocumentId,
    pub score: f32,
    pub title: Option<String>,
}

/// Storage for id-keyed vectors with nearest-neighbour lookup.
///
/// Upserting an id that already exists replaces its vector and payload.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Creates the collection if missing. An existing collection with the same
    /// dimension and metric is left untouched, a different one is a
    /// [`SearchError::SchemaConflict`].
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// Whether a collection named `name` exists. Never creates anything.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Drops and recreates the collection, discarding every entry.
    async fn recreate_collection(&self, spec: &CollectionSpec) -> Result<()>;

    async fn upsert(&self, spec: &CollectionSpec, points: Vec<IndexPoint>) -> Result<()>;

    /// Returns at most `limit` hits ordered by descending score.
    async fn query(
        &self,
        spec: &CollectionSpec,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    async fn count(&self, spec: &CollectionSpec) -> Result<u64>;

    async fn list_ids(&self, spec: &CollectionSpec) -> Result<Vec<DocumentId>>;
}
