//! Database repositories
//!
//! One repository per entity, each a trait plus a SQLx implementation that
//! serves both SQLite and MySQL.

pub mod content;
pub mod user;

pub use content::{ContentRepository, SqlxContentRepository};
pub use user::{SqlxUserRepository, UserRepository};
