//! Revoked session token ids, held in moka
//!
//! Entries live as long as a session token can, so a revoked id can never
//! outlive the denylist entry that blocks it.

use moka::future::Cache;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::models::SessionClaims;

/// Default maximum number of revoked ids kept in memory
const DEFAULT_MAX_CAPACITY: u64 = 100_000;

/// Fallback lifetime when the configured TTL cannot be represented
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Denylist of token ids that were logged out before they expired
#[derive(Clone)]
pub struct RevocationList {
    cache: Cache<String, i64>,
    ttl: Duration,
}

impl std::fmt::Debug for RevocationList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationList")
            .field("entry_count", &self.cache.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl RevocationList {
    /// Create a denylist whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(DEFAULT_MAX_CAPACITY)
            .time_to_live(ttl)
            .build();

        Self { cache, ttl }
    }

    /// Build the denylist when the session config enables it
    pub fn from_config(config: &SessionConfig) -> Option<Self> {
        if !config.revocation_enabled {
            return None;
        }
        let ttl = config.ttl().to_std().unwrap_or(DEFAULT_TTL);
        Some(Self::new(ttl))
    }

    /// Revoke the token the claims came from. Tokens without an id are ignored.
    pub async fn revoke(&self, claims: &SessionClaims) {
        self.revoke_id(&claims.token_id, claims.expires_at).await;
    }

    /// Revoke a token by id, recording when it would have expired
    pub async fn revoke_id(&self, token_id: &str, expires_at: i64) {
        if token_id.is_empty() {
            return;
        }
        self.cache.insert(token_id.to_string(), expires_at).await;
        tracing::debug!("Revoked session token {}", token_id);
    }

    pub async fn is_revoked(&self, token_id: &str) -> bool {
        !token_id.is_empty() && self.cache.contains_key(token_id)
    }

    /// Number of ids currently held
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
