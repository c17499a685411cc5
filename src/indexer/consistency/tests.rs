use super::*;
use crate::database::sqlite::models::NewPost;
use crate::identity::{DocumentId, IdentifierAuthority};
use crate::indexer::tests::fixture;

fn report(missing: &[&str], orphaned: &[&str]) -> ConsistencyReport {
    ConsistencyReport {
        posts: 10,
        indexed_entries: 9,
        missing_in_index: missing.iter().map(ToString::to_string).collect(),
        orphaned_in_index: orphaned.iter().map(ToString::to_string).collect(),
        is_consistent: missing.is_empty() && orphaned.is_empty(),
    }
}

async fn store_post(database: &Database, title: &str, description: &str) -> DocumentId {
    let new_post = NewPost {
        id: IdentifierAuthority::new_id(),
        title: title.to_string(),
        description: description.to_string(),
    };
    database
        .insert_post(&new_post)
        .await
        .expect("post is stored");
    new_post.id
}

#[test]
fn consistency_report_creation() {
    let report = report(&["a", "b"], &[]);

    assert_eq!(report.total_issues(), 2);
    assert!(!report.is_consistent);
    assert!(report.summary().contains("Inconsistencies found"));
}

#[test]
fn consistent_report() {
    let report = report(&[], &[]);

    assert_eq!(report.total_issues(), 0);
    assert_eq!(report.summary(), "Consistent: 10 posts, 9 index entries");
}

#[test]
fn consistency_report_summary_formats_correctly() {
    let summary = report(&["a", "b", "c"], &["orphan"]).summary();
    assert!(summary.contains("3 missing in index"));
    assert!(summary.contains("1 orphaned in index"));
}

#[tokio::test]
async fn empty_stores_are_consistent() {
    let fixture = fixture().await;
    let validator = ConsistencyValidator::new(&fixture.database, &fixture.service);

    let report = validator.validate_consistency().await.expect("validation runs");

    assert!(report.is_consistent);
    assert_eq!(report.posts, 0);
    assert_eq!(report.indexed_entries, 0);
}

#[tokio::test]
async fn detects_missing_and_orphaned_entries() {
    let fixture = fixture().await;
    let indexed = store_post(&fixture.database, "Indexed", "kept in sync").await;
    fixture
        .service
        .index_document(indexed.as_str(), "Indexed", "kept in sync")
        .await
        .expect("indexed");
    fixture
        .database
        .mark_indexed(indexed.as_str())
        .await
        .expect("marked");

    let missing = store_post(&fixture.database, "Missing", "never indexed").await;
    fixture
        .service
        .index_document("ghost", "Ghost", "no post row")
        .await
        .expect("orphan indexed");

    let validator = ConsistencyValidator::new(&fixture.database, &fixture.service);
    let report = validator.validate_consistency().await.expect("validation runs");

    assert!(!report.is_consistent);
    assert_eq!(report.posts, 2);
    assert_eq!(report.indexed_entries, 2);
    assert_eq!(report.missing_in_index, vec![missing.to_string()]);
    assert_eq!(report.orphaned_in_index, vec!["ghost".to_string()]);
}

#[tokio::test]
async fn unmarked_posts_count_as_missing_even_when_indexed() {
    let fixture = fixture().await;
    let id = store_post(&fixture.database, "Half written", "index write landed").await;
    fixture
        .service
        .index_document(id.as_str(), "Half written", "index write landed")
        .await
        .expect("indexed");

    let validator = ConsistencyValidator::new(&fixture.database, &fixture.service);
    let report = validator.validate_consistency().await.expect("validation runs");

    assert_eq!(report.missing_in_index, vec![id.to_string()]);
    assert!(report.orphaned_in_index.is_empty());
}

#[tokio::test]
async fn reconcile_reindexes_missing_posts() {
    let fixture = fixture().await;
    let first = store_post(&fixture.database, "Intro to caches", "LRU and eviction").await;
    let second = store_post(&fixture.database, "Consensus protocols", "Raft").await;
    fixture
        .service
        .index_document("ghost", "Ghost", "no post row")
        .await
        .expect("orphan indexed");

    let validator = ConsistencyValidator::new(&fixture.database, &fixture.service);
    let (report, stats) = validator.reconcile().await.expect("reconcile runs");

    assert_eq!(report.missing_in_index.len(), 2);
    assert_eq!(stats.reindexed, 2);
    assert!(stats.failed.is_empty());
    assert_eq!(
        fixture
            .database
            .count_unindexed_posts()
            .await
            .expect("count"),
        0
    );

    let after = validator.validate_consistency().await.expect("validation runs");
    assert!(after.missing_in_index.is_empty());
    // Orphans are reported, never removed
    assert_eq!(after.orphaned_in_index, vec!["ghost".to_string()]);

    let ids: Vec<String> = fixture
        .service
        .indexed_ids()
        .await
        .expect("index ids")
        .into_iter()
        .map(String::from)
        .collect();
    assert!(ids.contains(&first.to_string()));
    assert!(ids.contains(&second.to_string()));
}

#[tokio::test]
async fn reindex_failures_are_listed() {
    let fixture = fixture().await;
    let bad = store_post(&fixture.database, "Bad", "poison").await;

    let validator = ConsistencyValidator::new(&fixture.database, &fixture.service);
    let (_, stats) = validator.reconcile().await.expect("reconcile runs");

    assert_eq!(stats.reindexed, 0);
    assert_eq!(stats.failed, vec![bad.to_string()]);
    assert_eq!(
        fixture
            .database
            .count_unindexed_posts()
            .await
            .expect("count"),
        1
    );
}
