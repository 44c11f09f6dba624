//! Database layer
//!
//! SQLite (default) or MySQL behind the `DatabasePool` trait, code-embedded
//! migrations, and the user and content repositories.
//!
//! ```ignore
//! use myflix::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
