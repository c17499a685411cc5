
use super::models::{NewPost, Post};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

const POST_COLUMNS: &str = "id, title, description, created_date, indexed_date";

pub struct PostQueries;

impl PostQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_post: NewPost) -> Result<Post> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO posts (id, title, description, created_date) VALUES (?, ?, ?, ?)",
        )
        .bind(new_post.id.as_str())
        .bind(&new_post.title)
        .bind(&new_post.description)
        .bind(now)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to create post {}", new_post.id))?;

        debug!("Created post {}", new_post.id);
        Self::get_by_id(pool, new_post.id.as_str())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created post"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Post>> {
        let result = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by id")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Post>> {
        let results = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_date, id"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

        Ok(results)
    }

    /// Posts persisted without a successful index write
    #[inline]
    pub async fn list_unindexed(pool: &SqlitePool) -> Result<Vec<Post>> {
        let results = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE indexed_date IS NULL ORDER BY created_date, id"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list unindexed posts")?;

        Ok(results)
    }

    #[inline]
    pub async fn list_ids(pool: &SqlitePool) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM posts ORDER BY id")
            .fetch_all(pool)
            .await
            .context("Failed to list post ids")?;

        Ok(ids)
    }

    #[inline]
    pub async fn mark_indexed(pool: &SqlitePool, id: &str) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let rows = sqlx::query("UPDATE posts SET indexed_date = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to mark post as indexed")?
            .rows_affected();

        if rows == 0 {
            warn!("Tried to mark unknown post {} as indexed", id);
        }
        Ok(rows > 0)
    }

    /// Clears every `indexed_date`, used after the vector collection is reset
    #[inline]
    pub async fn mark_all_unindexed(pool: &SqlitePool) -> Result<u64> {
        let rows = sqlx::query("UPDATE posts SET indexed_date = NULL")
            .execute(pool)
            .await
            .context("Failed to reset indexed dates")?
            .rows_affected();
        Ok(rows)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
            .fetch_one(pool)
            .await
            .context("Failed to count posts")?;
        Ok(count)
    }

    #[inline]
    pub async fn count_unindexed(pool: &SqlitePool) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE indexed_date IS NULL")
                .fetch_one(pool)
                .await
                .context("Failed to count unindexed posts")?;
        Ok(count)
    }
}
