// Indexer module
// Bulk seeding and reconciliation between the post store and the vector index

pub mod consistency;


use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::database::sqlite::Database;
use crate::database::sqlite::models::NewPost;
use crate::identity::{DocumentId, IdentifierAuthority};
use crate::service::{Document, IndexingService};
use crate::{Result, SearchError};

pub use consistency::{ConsistencyReport, ConsistencyValidator, ReindexStats};

/// One post in a seed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRecord {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Reads a JSON array of `{ "title", "description" }` objects
#[inline]
pub fn read_seed_file(path: &Path) -> Result<Vec<SeedRecord>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| {
        SearchError::Validation(format!("Invalid seed file {}: {e}", path.display()))
    })
}

/// Outcome of a bulk load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub inserted: usize,
    pub indexed: usize,
    /// Posts stored but left out of the index; `reconcile` picks them up
    pub not_indexed: Vec<DocumentId>,
}

impl LoadStats {
    #[inline]
    pub fn failed(&self) -> usize {
        self.not_indexed.len()
    }
}

/// Seeds the post store and the index together with freshly minted ids
pub struct BulkLoader<'a> {
    database: &'a Database,
    service: &'a IndexingService,
    show_progress: bool,
}

impl<'a> BulkLoader<'a> {
    #[inline]
    pub fn new(database: &'a Database, service: &'a IndexingService) -> Self {
        Self {
            database,
            service,
            show_progress: false,
        }
    }

    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Drops every index entry. Stored posts stay and are marked unindexed.
    #[inline]
    pub async fn reset(&self) -> Result<u64> {
        warn!("Resetting the vector index before seeding");
        self.service.recreate_collection().await?;
        let unmarked = self.database.mark_all_unindexed().await?;
        info!("{} stored posts are now awaiting reindexing", unmarked);
        Ok(unmarked)
    }

    /// Stores every record under a new id, then indexes them with bounded concurrency
    #[inline]
    pub async fn load(&self, records: Vec<SeedRecord>) -> Result<LoadStats> {
        let mut stats = LoadStats::default();
        if records.is_empty() {
            info!("Seed input is empty, nothing to load");
            return Ok(stats);
        }

        let mut documents = Vec::with_capacity(records.len());
        for record in records {
            let new_post = NewPost {
                id: IdentifierAuthority::new_id(),
                title: record.title,
                description: record.description,
            };
            self.database.insert_post(&new_post).await?;
            stats.inserted += 1;
            documents.push(Document {
                id: new_post.id,
                title: new_post.title,
                description: new_post.description,
            });
        }
        info!("Stored {} posts, indexing", stats.inserted);

        self.index_all(documents, &mut stats).await?;

        info!(
            "Seeding finished: {} stored, {} indexed, {} not indexed",
            stats.inserted,
            stats.indexed,
            stats.failed()
        );
        Ok(stats)
    }

    /// Reads `path` and loads it, optionally resetting the index first
    #[inline]
    pub async fn load_file(&self, path: &Path, reset: bool) -> Result<LoadStats> {
        let records = read_seed_file(path)?;
        debug!("Read {} seed records from {}", records.len(), path.display());
        if reset {
            self.reset().await?;
        }
        self.load(records).await
    }

    async fn index_all(&self, documents: Vec<Document>, stats: &mut LoadStats) -> Result<()> {
        let bar = self.progress_bar(documents.len());
        let service = self.service;

        let mut results = futures::stream::iter(documents)
            .map(|document| async move {
                let outcome = service.reindex(&document).await;
                (document.id, outcome)
            })
            .buffer_unordered(service.max_workers());

        while let Some((id, outcome)) = results.next().await {
            match outcome {
                Ok(_) => {
                    self.database.mark_indexed(id.as_str()).await?;
                    stats.indexed += 1;
                }
                Err(e) => {
                    error!("Failed to index post {}: {}", id, e);
                    stats.not_indexed.push(id);
                }
            }
            bar.inc(1);
        }

        bar.finish_and_clear();
        Ok(())
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress || !console::user_attended_stderr() {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template("{bar:40} [{pos}/{len}] Indexing posts")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(len as u64).with_style(style)
    }
}
