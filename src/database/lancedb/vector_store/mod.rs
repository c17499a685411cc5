
use arrow::array::RecordBatchIterator;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::table::Table;
use lancedb::{Connection, DistanceType};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::{batch_ids, batch_to_hits, collection_schema, points_to_batch, schema_shape};
use crate::config::Config;
use crate::database::index::{CollectionSpec, DistanceMetric, IndexPoint, ScoredPoint, VectorIndex};
use crate::identity::DocumentId;
use crate::{Result, SearchError};

/// Embedded vector index stored in a local LanceDB directory
#[derive(Clone)]
pub struct VectorStore {
    connection: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for VectorStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn database_error(context: &str, err: lancedb::Error) -> SearchError {
    SearchError::Database(format!("{context}: {err}"))
}

fn distance_type(metric: DistanceMetric) -> DistanceType {
    match metric {
        DistanceMetric::Cosine => DistanceType::Cosine,
        DistanceMetric::Euclidean => DistanceType::L2,
        DistanceMetric::Dot => DistanceType::Dot,
    }
}

/// Keeps the last point per id so a single merge never sees duplicate keys.
fn dedupe_points(points: Vec<IndexPoint>) -> Vec<IndexPoint> {
    let mut positions: HashMap<DocumentId, usize> = HashMap::with_capacity(points.len());
    let mut unique: Vec<IndexPoint> = Vec::with_capacity(points.len());
    for point in points {
        if let Some(&pos) = positions.get(&point.id) {
            unique[pos] = point;
        } else {
            positions.insert(point.id.clone(), unique.len());
            unique.push(point);
        }
    }
    unique
}

impl VectorStore {
    /// Open the store at the location derived from the configuration
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(&config.vector_database_path()).await
    }

    /// Open (or create) a LanceDB directory at `db_path`
    #[inline]
    pub async fn open(db_path: &Path) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            SearchError::Database(format!("Failed to create vector database directory: {e}"))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            error!("Failed to connect to LanceDB: {}", e);
            SearchError::DependencyUnavailable(format!("Failed to connect to LanceDB: {e}"))
        })?;

        info!("Vector store opened at {}", db_path.display());
        Ok(Self {
            connection,
            path: db_path.to_path_buf(),
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| database_error("Failed to list tables", e))?;
        Ok(table_names.iter().any(|t| t == name))
    }

    async fn open_table(&self, name: &str) -> Result<Table> {
        self.connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| database_error("Failed to open table", e))
    }

    /// Opens the table when it exists, so read paths can treat a missing table as empty.
    async fn open_existing(&self, name: &str) -> Result<Option<Table>> {
        match self.connection.open_table(name).execute().await {
            Ok(table) => Ok(Some(table)),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(None),
            Err(e) => Err(database_error("Failed to open table", e)),
        }
    }

    async fn create_table(&self, spec: &CollectionSpec) -> Result<()> {
        match self
            .connection
            .create_empty_table(&spec.name, collection_schema(spec))
            .execute()
            .await
        {
            Ok(_) => {
                info!(
                    "Created table '{}' with {} dimensions ({})",
                    spec.name, spec.dimension, spec.metric
                );
                Ok(())
            }
            // Lost a creation race to another caller; verify what they created.
            Err(lancedb::Error::TableAlreadyExists { .. }) => self.verify_table(spec).await,
            Err(e) => Err(database_error("Failed to create table", e)),
        }
    }

    async fn verify_table(&self, spec: &CollectionSpec) -> Result<()> {
        let table = self.open_table(&spec.name).await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| database_error("Failed to get table schema", e))?;
        let (dimension, metric) = schema_shape(&schema)?;
        spec.check_existing(dimension, metric)
    }
}

#[async_trait]
impl VectorIndex for VectorStore {
    #[inline]
    fn backend_name(&self) -> &'static str {
        "lancedb"
    }

    #[inline]
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()> {
        if self.table_exists(&spec.name).await? {
            debug!("Table '{}' already exists, verifying shape", spec.name);
            return self.verify_table(spec).await;
        }
        self.create_table(spec).await
    }

    #[inline]
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.table_exists(name).await
    }

    #[inline]
    async fn recreate_collection(&self, spec: &CollectionSpec) -> Result<()> {
        if self.table_exists(&spec.name).await? {
            warn!("Dropping table '{}' and all of its vectors", spec.name);
            self.connection
                .drop_table(&spec.name)
                .await
                .map_err(|e| database_error("Failed to drop table", e))?;
        }
        self.create_table(spec).await
    }

    #[inline]
    async fn upsert(&self, spec: &CollectionSpec, points: Vec<IndexPoint>) -> Result<()> {
        if points.is_empty() {
            debug!("No points to upsert");
            return Ok(());
        }

        let points = dedupe_points(points);
        let batch = points_to_batch(spec, &points)?;
        let table = self.open_table(&spec.name).await?;

        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| database_error("Failed to upsert vectors", e))?;

        debug!("Upserted {} points into '{}'", points.len(), spec.name);
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

        let Some(table) = self.open_existing(&spec.name).await? else {
            return Ok(Vec::new());
        };

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| database_error("Failed to count rows", e))?;
        if rows == 0 {
            return Ok(Vec::new());
        }

        let mut results = table
            .vector_search(vector)
            .map_err(|e| database_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(distance_type(spec.metric))
            .select(Select::columns(&["id", "title"]))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| database_error("Failed to execute search", e))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| database_error("Failed to read result stream", e))?
        {
            hits.extend(batch_to_hits(&batch, spec.metric)?);
        }

        hits.truncate(limit);
        debug!("Query on '{}' returned {} hits", spec.name, hits.len());
        Ok(hits)
    }

    #[inline]
    async fn count(&self, spec: &CollectionSpec) -> Result<u64> {
        let Some(table) = self.open_existing(&spec.name).await? else {
            return Ok(0);
        };
        let count = table
            .count_rows(None)
            .await
            .map_err(|e| database_error("Failed to count rows", e))?;
        Ok(count as u64)
    }

    #[inline]
    async fn list_ids(&self, spec: &CollectionSpec) -> Result<Vec<DocumentId>> {
        let Some(table) = self.open_existing(&spec.name).await? else {
            return Ok(Vec::new());
        };

        let batches: Vec<_> = table
            .query()
            .select(Select::columns(&["id"]))
            .execute()
            .await
            .map_err(|e| database_error("Failed to scan ids", e))?
            .try_collect()
            .await
            .map_err(|e| database_error("Failed to read id stream", e))?;

        let mut ids = Vec::new();
        for batch in &batches {
            ids.extend(batch_ids(batch)?);
        }
        Ok(ids)
    }
}
