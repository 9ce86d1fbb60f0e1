//! User repository
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing it on SQLite
//!
//! Email and username columns use `COLLATE NOCASE`, so lookups by either
//! ignore case.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::sync::Arc;
use uuid::Uuid;

use super::{contains_pattern, non_empty};
use crate::db::DbPool;
use crate::models::{ListParams, User, UserQuery};

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Persist every profile and flag column, bumping `updated_at`
    async fn update(&self, user: &User) -> Result<User>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()>;

    /// Active users matching the query, with the total match count
    async fn list_active(&self, query: &UserQuery, params: &ListParams)
        -> Result<(Vec<User>, i64)>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DbPool,
}

impl SqlxUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DbPool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str = "u.id, u.email, u.username, u.password_hash, u.first_name, \
    u.last_name, u.bio, u.profile_picture, u.website, u.location, u.date_of_birth, \
    u.phone_number, u.is_verified, u.is_active, u.is_staff, u.created_at, u.updated_at";

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        create_user(&self.pool, user).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        get_user_where(&self.pool, "u.id = ?", id).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        get_user_where(&self.pool, "u.email = ?", email.trim().to_string()).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        get_user_where(&self.pool, "u.username = ?", username.trim().to_string()).await
    }

    async fn update(&self, user: &User) -> Result<User> {
        update_user(&self.pool, user).await
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update password")?;
        Ok(())
    }

    async fn list_active(
        &self,
        query: &UserQuery,
        params: &ListParams,
    ) -> Result<(Vec<User>, i64)> {
        list_active_users(&self.pool, query, params).await
    }
}

async fn create_user(pool: &DbPool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, username, password_hash, first_name, last_name, bio,
                           profile_picture, website, location, date_of_birth, phone_number,
                           is_verified, is_active, is_staff, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.bio)
    .bind(&user.profile_picture)
    .bind(&user.website)
    .bind(&user.location)
    .bind(user.date_of_birth)
    .bind(&user.phone_number)
    .bind(user.is_verified)
    .bind(user.is_active)
    .bind(user.is_staff)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(user.clone())
}

async fn get_user_where<T>(pool: &DbPool, condition: &str, value: T) -> Result<Option<User>>
where
    T: for<'q> sqlx::Encode<'q, Sqlite> + sqlx::Type<Sqlite> + Send + 'static,
{
    let sql = format!("SELECT {} FROM users u WHERE {}", USER_COLUMNS, condition);
    let row = sqlx::query(&sql)
        .bind(value)
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    row.as_ref().map(row_to_user).transpose()
}

async fn update_user(pool: &DbPool, user: &User) -> Result<User> {
    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE users
        SET email = ?, username = ?, first_name = ?, last_name = ?, bio = ?,
            profile_picture = ?, website = ?, location = ?, date_of_birth = ?,
            phone_number = ?, is_verified = ?, is_active = ?, is_staff = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.bio)
    .bind(&user.profile_picture)
    .bind(&user.website)
    .bind(&user.location)
    .bind(user.date_of_birth)
    .bind(&user.phone_number)
    .bind(user.is_verified)
    .bind(user.is_active)
    .bind(user.is_staff)
    .bind(now)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    let mut updated = user.clone();
    updated.updated_at = now;
    Ok(updated)
}

fn push_user_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, query: &'a UserQuery) {
    qb.push(" WHERE u.is_active = 1");

    if let Some(search) = non_empty(&query.search) {
        let pattern = contains_pattern(search);
        qb.push(" AND (u.username LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR u.first_name LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR u.last_name LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR u.bio LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(location) = non_empty(&query.location) {
        qb.push(" AND u.location = ").push_bind(location);
    }
    if let Some(username) = non_empty(&query.username) {
        qb.push(" AND u.username = ").push_bind(username);
    }
}

async fn list_active_users(
    pool: &DbPool,
    query: &UserQuery,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users u");
    push_user_filters(&mut count_qb, query);
    let total: i64 = count_qb
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM users u", USER_COLUMNS));
    push_user_filters(&mut qb, query);
    qb.push(" ORDER BY ")
        .push(query.ordering.to_sql())
        .push(", u.id ASC LIMIT ")
        .push_bind(params.limit())
        .push(" OFFSET ")
        .push_bind(params.offset());

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?;
    Ok((users, total))
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        bio: row.try_get("bio")?,
        profile_picture: row.try_get("profile_picture")?,
        website: row.try_get("website")?,
        location: row.try_get("location")?,
        date_of_birth: row.try_get("date_of_birth")?,
        phone_number: row.try_get("phone_number")?,
        is_verified: row.try_get("is_verified")?,
        is_active: row.try_get("is_active")?,
        is_staff: row.try_get("is_staff")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{is_unique_violation, test_support::migrated_pool};
    use crate::models::{SortOrder, UserSortField};

    async fn setup_test_repo() -> SqlxUserRepository {
        SqlxUserRepository::new(migrated_pool().await)
    }

    fn test_user(username: &str, email: &str) -> User {
        User::new(email.to_string(), username.to_string(), "hash".to_string())
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = setup_test_repo().await;
        let user = test_user("alice", "alice@example.com");
        repo.create(&user).await.expect("Failed to create user");

        let found = repo.get_by_id(user.id).await.unwrap().expect("User not found");
        assert_eq!(found.username, "alice");
        assert_eq!(found.email, "alice@example.com");
        assert!(found.is_active);
    }

    #[tokio::test]
    async fn test_lookup_ignores_case() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("Alice", "Alice@Example.com")).await.unwrap();

        assert!(repo.get_by_email("alice@example.com").await.unwrap().is_some());
        assert!(repo.get_by_username("ALICE").await.unwrap().is_some());
        assert!(repo.get_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("alice", "alice@example.com")).await.unwrap();

        let err = repo
            .create(&test_user("alice2", "ALICE@example.com"))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_update_user_profile() {
        let repo = setup_test_repo().await;
        let mut user = test_user("alice", "alice@example.com");
        repo.create(&user).await.unwrap();

        user.bio = "Writes about Rust".into();
        user.date_of_birth = chrono::NaiveDate::from_ymd_opt(1990, 5, 17);
        repo.update(&user).await.unwrap();

        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.bio, "Writes about Rust");
        assert_eq!(found.date_of_birth, user.date_of_birth);
    }

    #[tokio::test]
    async fn test_update_password() {
        let repo = setup_test_repo().await;
        let user = test_user("alice", "alice@example.com");
        repo.create(&user).await.unwrap();

        repo.update_password(user.id, "new-hash").await.unwrap();
        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn test_list_active_filters_and_orders() {
        let repo = setup_test_repo().await;
        let mut alice = test_user("alice", "alice@example.com");
        alice.bio = "rustacean".into();
        alice.location = "Berlin".into();
        repo.create(&alice).await.unwrap();

        let mut bob = test_user("bob", "bob@example.com");
        bob.location = "Paris".into();
        repo.create(&bob).await.unwrap();

        let mut carol = test_user("carol", "carol@example.com");
        carol.is_active = false;
        repo.create(&carol).await.unwrap();

        let params = ListParams::new(1, 10);
        let by_name = UserQuery {
            ordering: SortOrder::asc(UserSortField::Username),
            ..UserQuery::default()
        };
        let (users, total) = repo.list_active(&by_name, &params).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(users[0].username, "alice");
        assert_eq!(users[1].username, "bob");

        let search = UserQuery {
            search: Some("RUST".into()),
            ..UserQuery::default()
        };
        let (users, total) = repo.list_active(&search, &params).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(users[0].id, alice.id);

        let location = UserQuery {
            location: Some("Paris".into()),
            ..UserQuery::default()
        };
        let (users, _) = repo.list_active(&location, &params).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, bob.id);
    }
}
