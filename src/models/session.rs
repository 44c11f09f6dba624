//! Session claims model
//!
//! The payload carried inside a signed session token. Field names on the wire
//! follow the registered JWT claim names (`sub`, `iat`, `exp`, `jti`).

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserRole;

/// Claims of a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Stable identifier of the authenticated principal
    #[serde(rename = "sub")]
    pub subject_id: String,
    /// Email address, may be empty
    #[serde(default)]
    pub email: String,
    /// Display name
    #[serde(rename = "name", default)]
    pub display_name: String,
    /// Role string (`user` or `admin`)
    #[serde(default)]
    pub role: String,
    /// Issued-at, unix seconds
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Expiry, unix seconds
    #[serde(rename = "exp")]
    pub expires_at: i64,
    /// Token id, stable across refreshes
    #[serde(rename = "jti", default)]
    pub token_id: String,
}

impl SessionClaims {
    /// Build claims valid from now for `ttl`, with the canonical role.
    pub fn new(
        subject_id: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            subject_id: subject_id.into(),
            email: email.into(),
            display_name: display_name.into(),
            role: UserRole::default().to_string(),
            issued_at: now.timestamp(),
            expires_at: (now + ttl).timestamp(),
            token_id: Uuid::new_v4().to_string(),
        }
    }

    /// Replace the role
    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role.to_string();
        self
    }

    /// Restart the validity window at now, keeping every other field
    pub fn renewed(&self, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            issued_at: now.timestamp(),
            expires_at: (now + ttl).timestamp(),
            ..self.clone()
        }
    }

    /// Role with blank or unknown values read as the default
    pub fn role(&self) -> UserRole {
        UserRole::from_claim(&self.role)
    }

    pub fn has_subject(&self) -> bool {
        !self.subject_id.trim().is_empty()
    }

    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.expires_at, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now().timestamp()
    }
}
