//! Data models
//!
//! - Database entities (User, Content)
//! - Session token claims
//! - Catalog query and page types

mod content;
mod session;
mod user;

pub use content::{Content, ContentPage, ContentQuery, ContentSort};
pub use session::SessionClaims;
pub use user::{User, UserRole, UserSummary};
