//! In-memory caches
//!
//! - Session token revocation list (moka), enabled by
//!   `session.revocation_enabled`

mod revocation;

pub use revocation::RevocationList;
