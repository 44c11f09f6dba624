//! Cookie session manager
//!
//! Creates, refreshes and destroys the signed session cookie. All changes are
//! queued on a [`CookieJar`] that the handler returns with its response.

use chrono::Duration;

use crate::cache::RevocationList;
use crate::config::SessionConfig;
use crate::models::SessionClaims;
use crate::services::cookies::{CookieJar, SetCookie};
use crate::services::token::{TokenCodec, TokenError};

/// Session token cookie of the OAuth provider, plain and `__Secure-` forms
pub const OAUTH_SESSION_COOKIES: [&str; 2] =
    ["oauth.session-token", "__Secure-oauth.session-token"];

/// Every cookie the OAuth provider may have set. Logout clears all of them.
pub const OAUTH_PROVIDER_COOKIES: [&str; 8] = [
    "oauth.session-token",
    "__Secure-oauth.session-token",
    "oauth.csrf-token",
    "__Host-oauth.csrf-token",
    "oauth.callback-url",
    "__Secure-oauth.callback-url",
    "oauth.pkce.code_verifier",
    "__Secure-oauth.pkce.code_verifier",
];

/// Issues and clears the session cookie
#[derive(Debug, Clone)]
pub struct SessionManager {
    codec: TokenCodec,
    cookie_name: String,
    ttl: Duration,
    secure: bool,
    revocations: Option<RevocationList>,
}

impl SessionManager {
    pub fn new(codec: TokenCodec, config: &SessionConfig) -> Self {
        Self {
            codec,
            cookie_name: config.cookie_name.clone(),
            ttl: config.ttl(),
            secure: config.secure_cookies,
            revocations: None,
        }
    }

    /// Check and record revoked token ids in `list`
    pub fn with_revocation(mut self, list: RevocationList) -> Self {
        self.revocations = Some(list);
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn revocations(&self) -> Option<&RevocationList> {
        self.revocations.as_ref()
    }

    /// Start a session for a principal with the default role.
    ///
    /// Queues the session cookie and returns the raw token.
    pub fn create(
        &self,
        jar: &mut CookieJar,
        subject_id: &str,
        display_name: &str,
        email: &str,
    ) -> Result<String, TokenError> {
        let claims = SessionClaims::new(subject_id, display_name, email, self.ttl);
        self.issue(jar, &claims)
    }

    /// Encode `claims` and queue them as the session cookie
    pub fn issue(&self, jar: &mut CookieJar, claims: &SessionClaims) -> Result<String, TokenError> {
        let token = self.codec.encode(claims)?;
        jar.add(SetCookie::session(
            self.cookie_name.clone(),
            token.clone(),
            claims.expires_at_utc(),
            self.secure,
        ));
        tracing::debug!("Issued session for subject {}", claims.subject_id);
        Ok(token)
    }

    /// Claims of the session cookie in `jar`, if it is valid and not revoked.
    /// Has no side effects.
    pub async fn current(&self, jar: &CookieJar) -> Option<SessionClaims> {
        let token = jar.get(&self.cookie_name)?;
        let claims = self.codec.decode(token)?;

        if let Some(revocations) = &self.revocations {
            if revocations.is_revoked(&claims.token_id).await {
                tracing::debug!("Rejected revoked session token {}", claims.token_id);
                return None;
            }
        }

        Some(claims)
    }

    /// Extend the current session by the full TTL.
    ///
    /// No cookie gives `None`. A cookie that does not decode, or whose token
    /// was revoked, gives `None` and is cleared.
    pub async fn refresh(&self, jar: &mut CookieJar) -> Option<SessionClaims> {
        if !jar.contains(&self.cookie_name) {
            return None;
        }

        let Some(claims) = self.current(jar).await else {
            jar.remove(&self.cookie_name, self.secure);
            return None;
        };

        let renewed = claims.renewed(self.ttl);
        match self.issue(jar, &renewed) {
            Ok(_) => Some(renewed),
            Err(e) => {
                tracing::error!("Failed to refresh session: {}", e);
                None
            }
        }
    }

    /// Clear the session cookie and every OAuth provider cookie.
    ///
    /// Idempotent; deletions are queued whether or not the cookies exist.
    pub fn destroy(&self, jar: &mut CookieJar) {
        jar.remove(&self.cookie_name, self.secure);
        for name in OAUTH_PROVIDER_COOKIES {
            jar.remove(name, self.secure);
        }
    }

    /// Deny further use of the token behind `claims`, when revocation is on
    pub async fn revoke(&self, claims: &SessionClaims) {
        if let Some(revocations) = &self.revocations {
            revocations.revoke(claims).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, HeaderValue};
    use secrecy::SecretString;

    const SECRET: &str = "session-test-secret-session-test-secret";

    fn manager() -> SessionManager {
        let codec = TokenCodec::new(&SecretString::from(SECRET));
        SessionManager::new(codec, &SessionConfig::default())
    }

    fn jar_with(cookie: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        CookieJar::from_headers(&headers)
    }

    /// Carry the cookies queued on `jar` into a fresh request jar
    fn next_request(jar: &CookieJar) -> CookieJar {
        let cookie = jar
            .pending()
            .iter()
            .filter(|c| !c.is_removal())
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        jar_with(&cookie)
    }

    #[tokio::test]
    async fn test_create_sets_secure_cookie() {
        let manager = manager();
        let mut jar = CookieJar::new();

        let token = manager
            .create(&mut jar, "42", "Alice", "alice@example.com")
            .unwrap();

        let cookie = jar.pending_for("session").unwrap();
        assert_eq!(cookie.value, token);
        assert!(cookie.http_only);
        assert!(cookie.secure);
        assert_eq!(cookie.path, "/");

        let rendered = cookie.to_string();
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("Expires="));

        let claims = manager.current(&next_request(&jar)).await.unwrap();
        assert_eq!(claims.subject_id, "42");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.role, "user");
    }

    #[tokio::test]
    async fn test_refresh_without_cookie_is_none() {
        let mut jar = CookieJar::new();
        assert!(manager().refresh(&mut jar).await.is_none());
        assert!(jar.pending().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_extends_expiry_and_keeps_subject() {
        let manager = manager();
        let mut claims = SessionClaims::new("42", "Alice", "alice@example.com", Duration::hours(1));
        claims.issued_at -= 1800;
        let token = TokenCodec::new(&SecretString::from(SECRET)).encode(&claims).unwrap();

        let mut jar = jar_with(&format!("session={}", token));
        let before = chrono::Utc::now().timestamp();
        let refreshed = manager.refresh(&mut jar).await.unwrap();

        assert_eq!(refreshed.subject_id, "42");
        assert_eq!(refreshed.token_id, claims.token_id);
        let expected = before + 24 * 60 * 60;
        assert!((refreshed.expires_at - expected).abs() <= 2);

        let cookie = jar.pending_for("session").unwrap();
        assert!(!cookie.is_removal());
        assert_ne!(cookie.value, token);
    }

    #[tokio::test]
    async fn test_refresh_clears_undecodable_cookie() {
        let manager = manager();
        let mut jar = jar_with("session=not-a-token");

        assert!(manager.refresh(&mut jar).await.is_none());
        assert!(jar.pending_for("session").unwrap().is_removal());
        assert!(jar.get("session").is_none());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_clears_provider_cookies() {
        let manager = manager();
        let mut jar = CookieJar::new();
        manager.create(&mut jar, "42", "Alice", "").unwrap();

        manager.destroy(&mut jar);
        manager.destroy(&mut jar);

        assert!(jar.get("session").is_none());
        assert!(jar.pending_for("session").unwrap().is_removal());
        for name in OAUTH_PROVIDER_COOKIES {
            assert!(jar.pending_for(name).unwrap().is_removal(), "{} not cleared", name);
        }
        // One entry per cookie name, however often destroy runs
        assert_eq!(jar.pending().len(), OAUTH_PROVIDER_COOKIES.len() + 1);
    }

    #[tokio::test]
    async fn test_revoked_token_is_rejected_and_cleared() {
        let list = RevocationList::new(std::time::Duration::from_secs(60));
        let manager = manager().with_revocation(list);
        let mut jar = CookieJar::new();
        manager.create(&mut jar, "42", "Alice", "").unwrap();

        let mut request = next_request(&jar);
        let claims = manager.current(&request).await.unwrap();
        manager.revoke(&claims).await;

        assert!(manager.current(&request).await.is_none());
        assert!(manager.refresh(&mut request).await.is_none());
        assert!(request.pending_for("session").unwrap().is_removal());
    }

    #[tokio::test]
    async fn test_revoke_without_list_is_noop() {
        let manager = manager();
        let mut jar = CookieJar::new();
        manager.create(&mut jar, "42", "Alice", "").unwrap();

        let request = next_request(&jar);
        let claims = manager.current(&request).await.unwrap();
        manager.revoke(&claims).await;

        assert!(manager.current(&request).await.is_some());
    }
}
