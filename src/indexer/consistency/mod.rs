// Consistency validation between the post store and the vector index

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::database::sqlite::Database;
use crate::service::IndexingService;

/// Compares post rows with index entries
pub struct ConsistencyValidator<'a> {
    database: &'a Database,
    service: &'a IndexingService,
}

/// Results of a consistency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub posts: usize,
    pub indexed_entries: usize,
    /// Stored posts with no index entry, or never marked as indexed
    pub missing_in_index: Vec<String>,
    /// Index entries whose id has no post row
    pub orphaned_in_index: Vec<String>,
    pub is_consistent: bool,
}

/// Outcome of a reindex pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexStats {
    pub reindexed: usize,
    pub failed: Vec<String>,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(database: &'a Database, service: &'a IndexingService) -> Self {
        Self { database, service }
    }

    /// Validate consistency between the post store and the vector index
    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        info!("Starting consistency validation between posts and vector index");

        let post_ids: HashSet<String> = self.database.list_post_ids().await?.into_iter().collect();
        let unindexed: HashSet<String> = self
            .database
            .list_unindexed_posts()
            .await?
            .into_iter()
            .map(|post| post.id)
            .collect();
        let index_ids: HashSet<String> = self
            .service
            .indexed_ids()
            .await?
            .into_iter()
            .map(String::from)
            .collect();

        debug!(
            "Found {} posts and {} index entries",
            post_ids.len(),
            index_ids.len()
        );

        let mut missing_in_index: Vec<String> = post_ids
            .iter()
            .filter(|id| !index_ids.contains(*id) || unindexed.contains(*id))
            .cloned()
            .collect();
        missing_in_index.sort();

        let mut orphaned_in_index: Vec<String> =
            index_ids.difference(&post_ids).cloned().collect();
        orphaned_in_index.sort();

        let is_consistent = missing_in_index.is_empty() && orphaned_in_index.is_empty();

        let report = ConsistencyReport {
            posts: post_ids.len(),
            indexed_entries: index_ids.len(),
            missing_in_index,
            orphaned_in_index,
            is_consistent,
        };

        if report.is_consistent {
            info!("Post store and vector index are consistent");
        } else {
            log_consistency_issues(&report);
        }

        Ok(report)
    }

    /// Re-runs the idempotent upsert for every post the index is missing
    #[inline]
    pub async fn reindex_missing(&self, report: &ConsistencyReport) -> Result<ReindexStats> {
        let mut stats = ReindexStats::default();
        if report.missing_in_index.is_empty() {
            return Ok(stats);
        }

        info!("Reindexing {} posts", report.missing_in_index.len());

        for id in &report.missing_in_index {
            let Some(post) = self.database.get_post(id).await? else {
                warn!("Post {} disappeared before it could be reindexed", id);
                continue;
            };

            match self.service.reindex(&post.to_document()?).await {
                Ok(_) => {
                    self.database.mark_indexed(id).await?;
                    stats.reindexed += 1;
                    debug!("Reindexed post {}", id);
                }
                Err(e) => {
                    error!("Failed to reindex post {}: {}", id, e);
                    stats.failed.push(id.clone());
                }
            }
        }

        info!(
            "Reindexed {} posts, {} still missing",
            stats.reindexed,
            stats.failed.len()
        );
        Ok(stats)
    }

    /// Checks, then reindexes whatever the check found missing
    #[inline]
    pub async fn reconcile(&self) -> Result<(ConsistencyReport, ReindexStats)> {
        let report = self.validate_consistency().await?;
        let stats = self.reindex_missing(&report).await?;
        Ok((report, stats))
    }
}

fn log_consistency_issues(report: &ConsistencyReport) {
    if !report.missing_in_index.is_empty() {
        warn!(
            "Found {} posts missing from the vector index",
            report.missing_in_index.len()
        );
    }

    if !report.orphaned_in_index.is_empty() {
        warn!(
            "Found {} orphaned entries in the vector index",
            report.orphaned_in_index.len()
        );
    }
}

impl ConsistencyReport {
    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Consistent: {} posts, {} index entries",
                self.posts, self.indexed_entries
            )
        } else {
            format!(
                "Inconsistencies found: {} missing in index, {} orphaned in index",
                self.missing_in_index.len(),
                self.orphaned_in_index.len()
            )
        }
    }

    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_in_index.len() + self.orphaned_in_index.len()
    }
}
