//! API token repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::DbPool;
use crate::models::AuthToken;

/// Token repository trait
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Store a token, replacing any token the user already holds
    async fn replace(&self, token: &AuthToken) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<AuthToken>>;

    async fn get_by_user(&self, user_id: Uuid) -> Result<Option<AuthToken>>;

    /// Returns whether a token was removed
    async fn delete_by_user(&self, user_id: Uuid) -> Result<bool>;

    /// Remove every expired token, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

pub struct SqlxTokenRepository {
    pool: DbPool,
}

impl SqlxTokenRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DbPool) -> Arc<dyn TokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TokenRepository for SqlxTokenRepository {
    async fn replace(&self, token: &AuthToken) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM auth_tokens WHERE user_id = ?")
            .bind(token.user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear previous token")?;
        sqlx::query(
            "INSERT INTO auth_tokens (key, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token.key)
        .bind(token.user_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&mut *tx)
        .await
        .context("Failed to create token")?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<AuthToken>> {
        let row = sqlx::query(
            "SELECT key, user_id, created_at, expires_at FROM auth_tokens WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get token")?;
        row.as_ref().map(row_to_token).transpose()
    }

    async fn get_by_user(&self, user_id: Uuid) -> Result<Option<AuthToken>> {
        let row = sqlx::query(
            "SELECT key, user_id, created_at, expires_at FROM auth_tokens WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get token for user")?;
        row.as_ref().map(row_to_token).transpose()
    }

    async fn delete_by_user(&self, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete token")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM auth_tokens WHERE expires_at IS NOT NULL AND expires_at <= ?")
                .bind(Utc::now())
                .execute(&self.pool)
                .await
                .context("Failed to delete expired tokens")?;
        Ok(result.rows_affected())
    }
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> Result<AuthToken> {
    Ok(AuthToken {
        key: row.try_get("key")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{test_support::migrated_pool, SqlxUserRepository, UserRepository};
    use crate::models::User;
    use chrono::Duration;

    async fn setup() -> (SqlxTokenRepository, Uuid) {
        let pool = migrated_pool().await;
        let user = User::new("t@example.com".into(), "tokenuser".into(), "hash".into());
        SqlxUserRepository::new(pool.clone()).create(&user).await.unwrap();
        (SqlxTokenRepository::new(pool), user.id)
    }

    fn token(key: &str, user_id: Uuid, expires_in: Option<Duration>) -> AuthToken {
        AuthToken {
            key: key.to_string(),
            user_id,
            created_at: Utc::now(),
            expires_at: expires_in.map(|d| Utc::now() + d),
        }
    }

    #[tokio::test]
    async fn test_replace_keeps_one_token_per_user() {
        let (repo, user_id) = setup().await;
        repo.replace(&token("first", user_id, None)).await.unwrap();
        repo.replace(&token("second", user_id, None)).await.unwrap();

        assert!(repo.get("first").await.unwrap().is_none());
        let current = repo.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(current.key, "second");
    }

    #[tokio::test]
    async fn test_delete_by_user() {
        let (repo, user_id) = setup().await;
        repo.replace(&token("k", user_id, None)).await.unwrap();

        assert!(repo.delete_by_user(user_id).await.unwrap());
        assert!(!repo.delete_by_user(user_id).await.unwrap());
        assert!(repo.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let (repo, user_id) = setup().await;
        repo.replace(&token("old", user_id, Some(Duration::seconds(-5))))
            .await
            .unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get("old").await.unwrap().is_none());
    }
}
