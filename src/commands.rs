use std::path::Path;
use tracing::{error, info, warn};

use crate::config::{Config, IndexBackend};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::NewPost;
use crate::embeddings::OllamaClient;
use crate::identity::IdentifierAuthority;
use crate::indexer::{BulkLoader, ConsistencyValidator};
use crate::service::IndexingService;
use crate::{Result, SearchError};

async fn open_database(config: &Config) -> Result<Database> {
    Ok(Database::initialize_from_config_dir(config.get_base_dir()).await?)
}

/// Store a new post and index it under the same freshly minted id
#[inline]
pub async fn add_post(config: &Config, title: &str, description: &str) -> Result<()> {
    let database = open_database(config).await?;
    let service = IndexingService::from_config(config);

    let new_post = NewPost {
        id: IdentifierAuthority::new_id(),
        title: title.to_string(),
        description: description.to_string(),
    };
    let post = database.insert_post(&new_post).await?;
    println!("Stored post: {} (ID: {})", post.title, post.id);

    match service.reindex(&post.to_document()?).await {
        Ok(id) => {
            database.mark_indexed(id.as_str()).await?;
            println!("✅ Indexed post {}", id);
            Ok(())
        }
        Err(e) => {
            error!("Post {} was stored but not indexed: {}", post.id, e);
            println!("❌ Post {} was stored but NOT indexed", post.id);
            if e.is_retryable() {
                println!("   Run 'post-search reconcile' once the index is reachable.");
            }
            Err(e)
        }
    }
}

/// Run a semantic search and print ranked results
#[inline]
pub async fn search_posts(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    let limit = limit.unwrap_or(config.service.default_search_limit);
    let service = IndexingService::from_config(config);

    let hits = service.search(query, limit).await?;
    let found = hits.len();
    if found == 0 {
        println!("No matching posts.");
        return Ok(());
    }

    println!("{} results for {:?}:", found, query);
    for (rank, hit) in hits.enumerate() {
        println!(
            "{:>3}. {:.4}  {}  {}",
            rank + 1,
            hit.rounded_score(),
            hit.id,
            hit.title.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

/// Re-run indexing for one stored post
#[inline]
pub async fn index_post(config: &Config, id: &str) -> Result<()> {
    let database = open_database(config).await?;
    let post = database
        .get_post(id)
        .await?
        .ok_or_else(|| SearchError::Validation(format!("No post with id {id}")))?;

    let service = IndexingService::from_config(config);
    match service.reindex(&post.to_document()?).await {
        Ok(id) => {
            database.mark_indexed(id.as_str()).await?;
            println!("✅ Indexed post {}", id);
            Ok(())
        }
        Err(e) => {
            println!("❌ Post {} was NOT indexed", post.id);
            Err(e)
        }
    }
}

/// List all stored posts with their index state
#[inline]
pub async fn list_posts(config: &Config) -> Result<()> {
    let database = open_database(config).await?;
    let posts = database.list_posts().await?;

    if posts.is_empty() {
        println!("No posts have been added yet.");
        println!("Use 'post-search add --title <title> --description <text>' to add one.");
        return Ok(());
    }

    println!("Posts ({} total):", posts.len());
    println!();

    for post in &posts {
        println!("📝 {} (ID: {})", post.title, post.id);
        println!(
            "   Created: {}",
            post.created_date.format("%Y-%m-%d %H:%M:%S")
        );
        match post.indexed_date {
            Some(indexed) => println!("   Indexed: {}", indexed.format("%Y-%m-%d %H:%M:%S")),
            None => println!("   Indexed: ⚠️  not indexed"),
        }
    }

    Ok(())
}

/// Bulk load posts from a JSON seed file
#[inline]
pub async fn seed_posts(config: &Config, file: &Path, reset: bool) -> Result<()> {
    let database = open_database(config).await?;
    let service = IndexingService::from_config(config);

    info!("Seeding posts from {}", file.display());
    let stats = BulkLoader::new(&database, &service)
        .with_progress(true)
        .load_file(file, reset)
        .await?;

    println!("Seeding complete!");
    println!("  Stored: {}", stats.inserted);
    println!("  Indexed: {}", stats.indexed);
    if stats.failed() > 0 {
        println!("  Not indexed: {}", stats.failed());
        for id in &stats.not_indexed {
            println!("    {}", id);
        }
        println!("Run 'post-search reconcile' to retry them.");
        return Err(SearchError::Other(anyhow::anyhow!(
            "{} seeded posts were not indexed",
            stats.failed()
        )));
    }

    Ok(())
}

/// Compare the post store with the index and reindex whatever is missing
#[inline]
pub async fn reconcile(config: &Config, dry_run: bool) -> Result<()> {
    let database = open_database(config).await?;
    let service = IndexingService::from_config(config);
    let validator = ConsistencyValidator::new(&database, &service);

    let report = validator.validate_consistency().await?;
    println!("{}", report.summary());

    for id in &report.orphaned_in_index {
        println!("   orphaned index entry: {}", id);
    }

    if dry_run {
        for id in &report.missing_in_index {
            println!("   would reindex: {}", id);
        }
        return Ok(());
    }

    let stats = validator.reindex_missing(&report).await?;
    println!("Reindexed {} posts", stats.reindexed);
    if !stats.failed.is_empty() {
        for id in &stats.failed {
            println!("   still not indexed: {}", id);
        }
        return Err(SearchError::Other(anyhow::anyhow!(
            "{} posts could not be reindexed",
            stats.failed.len()
        )));
    }

    Ok(())
}

/// Show connectivity and index health
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Post Search Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Database Status:");
    let database = match open_database(config).await {
        Ok(db) => {
            println!("   ✅ SQLite: Connected");
            println!("   📁 Path: {}", config.database_path().display());
            Some(db)
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {}", e);
            None
        }
    };

    println!("🤖 Ollama Status:");
    match OllamaClient::new(config) {
        Ok(client) => match tokio::task::spawn_blocking(move || client.check_blocking()).await {
            Ok(Ok(())) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Model: {}", config.ollama.model);
            }
            Ok(Err(e)) => println!("   ⚠️  Ollama: Unhealthy - {}", e),
            Err(e) => println!("   ❌ Ollama: Health check aborted - {}", e),
        },
        Err(e) => println!("   ❌ Ollama: Invalid configuration - {}", e),
    }

    println!("🔍 Vector Index Status:");
    match config.index.backend {
        IndexBackend::LanceDb => println!(
            "   Backend: LanceDB at {}",
            config.vector_database_path().display()
        ),
        IndexBackend::Qdrant => println!(
            "   Backend: Qdrant at {}",
            config.index.endpoint.as_deref().unwrap_or("-")
        ),
    }
    println!("   Collection: {}", config.index.collection_name);

    let service = IndexingService::from_config(config);
    let indexed = match service.existing_count().await {
        Ok(Some(count)) => {
            println!("   ✅ Entries: {}", count);
            Some(count)
        }
        Ok(None) => {
            println!("   ⚠️  Collection not created yet");
            Some(0)
        }
        Err(e) => {
            warn!("Vector index status unavailable: {}", e);
            println!("   ❌ Unavailable - {}", e);
            None
        }
    };

    if let Some(database) = database {
        println!();
        println!("📝 Posts:");
        let total = database.count_posts().await?;
        let unindexed = database.count_unindexed_posts().await?;
        println!("   Stored: {}", total);
        println!("   Awaiting indexing: {}", unindexed);

        if let Some(indexed) = indexed {
            if u64::try_from(total).is_ok_and(|total| total != indexed) {
                println!(
                    "   ⚠️  Index holds {} entries for {} posts, run 'post-search reconcile --dry-run' for details",
                    indexed, total
                );
            }
        }
    }

    Ok(())
}
