//! Database layer
//!
//! SQLite via sqlx. `create_pool` opens the configured database,
//! `migrations::run_migrations` brings the schema up to date and the
//! `repositories` module holds one repository trait per table group.
//!
//! ```ignore
//! let pool = inkpost::db::create_pool(&config.database).await?;
//! inkpost::db::migrations::run_migrations(&pool).await?;
//! let users = SqlxUserRepository::boxed(pool.clone());
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, ping, DbPool};
