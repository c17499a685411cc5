use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{NewPost, Post};
use crate::database::sqlite::queries::PostQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

/// Primary post store
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("posts.db")).await
    }

    #[inline]
    pub async fn insert_post(&self, post: &NewPost) -> Result<Post> {
        PostQueries::create(&self.pool, post.clone()).await
    }

    #[inline]
    pub async fn get_post(&self, id: &str) -> Result<Option<Post>> {
        PostQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn list_posts(&self) -> Result<Vec<Post>> {
        PostQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn list_unindexed_posts(&self) -> Result<Vec<Post>> {
        PostQueries::list_unindexed(&self.pool).await
    }

    #[inline]
    pub async fn list_post_ids(&self) -> Result<Vec<String>> {
        PostQueries::list_ids(&self.pool).await
    }

    #[inline]
    pub async fn mark_indexed(&self, id: &str) -> Result<bool> {
        PostQueries::mark_indexed(&self.pool, id).await
    }

    #[inline]
    pub async fn mark_all_unindexed(&self) -> Result<u64> {
        PostQueries::mark_all_unindexed(&self.pool).await
    }

    #[inline]
    pub async fn count_posts(&self) -> Result<i64> {
        PostQueries::count(&self.pool).await
    }

    #[inline]
    pub async fn count_unindexed_posts(&self) -> Result<i64> {
        PostQueries::count_unindexed(&self.pool).await
    }
}
