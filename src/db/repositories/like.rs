//! Like repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::Like;

/// Like repository trait
#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// Returns `false` when the user had already liked the post
    async fn add(&self, blog_id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Returns `false` when there was nothing to remove
    async fn remove(&self, blog_id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn exists(&self, blog_id: Uuid, user_id: Uuid) -> Result<bool>;
}

pub struct SqlxLikeRepository {
    pool: DbPool,
}

impl SqlxLikeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn LikeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LikeRepository for SqlxLikeRepository {
    async fn add(&self, blog_id: Uuid, user_id: Uuid) -> Result<bool> {
        let like = Like::new(blog_id, user_id);
        let result = sqlx::query(
            "INSERT OR IGNORE INTO likes (id, blog_id, user_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(like.id)
        .bind(like.blog_id)
        .bind(like.user_id)
        .bind(like.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to add like")?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, blog_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM likes WHERE blog_id = ? AND user_id = ?")
            .bind(blog_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to remove like")?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, blog_id: Uuid, user_id: Uuid) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE blog_id = ? AND user_id = ?")
                .bind(blog_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check like")?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{test_support::migrated_pool, SqlxUserRepository, UserRepository};
    use crate::models::User;
    use chrono::Utc;

    #[tokio::test]
    async fn test_add_is_idempotent_and_remove_reports() {
        let pool = migrated_pool().await;
        let user = User::new("l@example.com".into(), "liker".into(), "hash".into());
        SqlxUserRepository::new(pool.clone()).create(&user).await.unwrap();

        let blog_id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO blogs (id, title, slug, author_id, content, created_at, updated_at)
             VALUES (?, 'Likeable Post', 'likeable-post', ?, 'body', ?, ?)",
        )
        .bind(blog_id)
        .bind(user.id)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let repo = SqlxLikeRepository::new(pool);
        assert!(repo.add(blog_id, user.id).await.unwrap());
        assert!(!repo.add(blog_id, user.id).await.unwrap());
        assert!(repo.exists(blog_id, user.id).await.unwrap());

        assert!(repo.remove(blog_id, user.id).await.unwrap());
        assert!(!repo.remove(blog_id, user.id).await.unwrap());
        assert!(!repo.exists(blog_id, user.id).await.unwrap());
    }
}
