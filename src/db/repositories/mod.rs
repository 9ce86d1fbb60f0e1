//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity.

pub mod blog;
pub mod category;
pub mod comment;
pub mod like;
pub mod token;
pub mod user;

pub use blog::{BlogRepository, SqlxBlogRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use like::{LikeRepository, SqlxLikeRepository};
pub use token::{SqlxTokenRepository, TokenRepository};
pub use user::{SqlxUserRepository, UserRepository};

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::models::UserSummary;

/// Build a `LIKE` pattern matching `needle` anywhere, with `\` as the escape
/// character. SQLite's `LIKE` already ignores ASCII case.
pub(crate) fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Trimmed, non-empty filter value
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Read an author block selected with the `author_` column prefix
pub(crate) fn row_to_author(row: &SqliteRow) -> Result<UserSummary> {
    let first_name: String = row.try_get("author_first_name")?;
    let last_name: String = row.try_get("author_last_name")?;
    Ok(UserSummary {
        id: row.try_get("author_id")?,
        username: row.try_get("author_username")?,
        full_name: format!("{} {}", first_name, last_name).trim().to_string(),
        profile_picture: row.try_get("author_profile_picture")?,
    })
}

/// Whether an error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map_or(false, |db| db.is_unique_violation())
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::{create_test_pool, migrations, DbPool};

    pub async fn migrated_pool() -> DbPool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }
}
