//! Identity resolution
//!
//! A request can carry two kinds of session: the OAuth provider's session
//! token and our own `session` cookie. Each is read by an
//! [`IdentityProvider`]; the [`IdentityResolver`] asks them in a fixed order
//! (OAuth first, then cookie) and the first identity with a subject wins.
//!
//! The result is memoized in the request extensions so the authorizer and
//! the handlers behind it decode the session at most once per request.

use async_trait::async_trait;
use axum::http::request::Parts;
use serde::Serialize;
use std::sync::Arc;

use crate::cache::RevocationList;
use crate::models::{SessionClaims, UserRole};
use crate::services::cookies::{CookieJar, SetCookie};
use crate::services::session::{SessionManager, OAUTH_SESSION_COOKIES};
use crate::services::token::{TokenCodec, TokenError, OAUTH_AUDIENCE};

/// Which session an identity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    OAuth,
    Cookie,
}

/// The principal behind a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject_id: String,
    pub email: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub role: UserRole,
    pub source: IdentitySource,
    /// Token id of the session, used for revocation
    #[serde(skip)]
    pub token_id: String,
    /// Expiry of the session, unix seconds
    pub expires_at: i64,
}

impl Identity {
    /// Identity carried by verified claims. Claims without a subject give none.
    pub fn from_claims(claims: SessionClaims, source: IdentitySource) -> Option<Self> {
        if !claims.has_subject() {
            return None;
        }
        let role = claims.role();
        Some(Self {
            subject_id: claims.subject_id,
            email: claims.email,
            display_name: claims.display_name,
            role,
            source,
            token_id: claims.token_id,
            expires_at: claims.expires_at,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// A source of identities
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Identity carried by the request's cookies, if any
    async fn identify(&self, jar: &CookieJar) -> Option<Identity>;
}

/// Profile handed over by an OAuth provider after its callback
#[derive(Debug, Clone, Default)]
pub struct OAuthProfile {
    /// Provider name, e.g. `github` or `google`
    pub provider: String,
    /// Account id at the provider
    pub account_id: String,
    /// Login or display name
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Reads the OAuth provider's session token cookie.
///
/// The provider signs its token with the OAuth secret (by default the session
/// secret) and the same claim layout as our own sessions, but for the
/// [`OAUTH_AUDIENCE`] audience, so a cookie session token is never accepted
/// here.
#[derive(Debug, Clone)]
pub struct OAuthSessionProvider {
    codec: TokenCodec,
    admin_emails: Vec<String>,
    ttl: chrono::Duration,
    secure: bool,
    revocations: Option<RevocationList>,
}

impl OAuthSessionProvider {
    pub fn new(
        codec: TokenCodec,
        admin_emails: &[String],
        ttl: chrono::Duration,
        secure: bool,
    ) -> Self {
        Self {
            codec: codec.with_audience(OAUTH_AUDIENCE),
            admin_emails: admin_emails.iter().map(|e| e.trim().to_lowercase()).collect(),
            ttl,
            secure,
            revocations: None,
        }
    }

    /// Reject provider tokens whose id was revoked
    pub fn with_revocation(mut self, list: RevocationList) -> Self {
        self.revocations = Some(list);
        self
    }

    /// Map a provider profile to session claims.
    ///
    /// Emails listed in `oauth.admin_emails` get the admin role; everyone else
    /// gets the default role.
    pub fn map_profile(&self, profile: &OAuthProfile) -> SessionClaims {
        let email = profile.email.clone().unwrap_or_default();
        let is_admin = !email.is_empty() && self.admin_emails.contains(&email.to_lowercase());
        let role = if is_admin { UserRole::Admin } else { UserRole::User };

        SessionClaims::new(
            format!("{}:{}", profile.provider, profile.account_id),
            profile.name.clone().unwrap_or_default(),
            email,
            self.ttl,
        )
        .with_role(role)
    }

    /// Write the provider session cookie for a profile, as the provider does
    /// at the end of its callback.
    pub fn issue(&self, jar: &mut CookieJar, profile: &OAuthProfile) -> Result<SessionClaims, TokenError> {
        let claims = self.map_profile(profile);
        let token = self.codec.encode(&claims)?;
        let name = if self.secure {
            OAUTH_SESSION_COOKIES[1]
        } else {
            OAUTH_SESSION_COOKIES[0]
        };
        jar.add(SetCookie::session(name, token, claims.expires_at_utc(), self.secure));
        Ok(claims)
    }
}

#[async_trait]
impl IdentityProvider for OAuthSessionProvider {
    fn name(&self) -> &'static str {
        "oauth"
    }

    async fn identify(&self, jar: &CookieJar) -> Option<Identity> {
        for token in OAUTH_SESSION_COOKIES.iter().filter_map(|name| jar.get(name)) {
            let Some(claims) = self.codec.decode(token) else {
                continue;
            };
            if let Some(revocations) = &self.revocations {
                if revocations.is_revoked(&claims.token_id).await {
                    tracing::debug!("Rejected revoked provider token {}", claims.token_id);
                    continue;
                }
            }
            if let Some(identity) = Identity::from_claims(claims, IdentitySource::OAuth) {
                return Some(identity);
            }
        }
        None
    }
}

/// Reads our own `session` cookie
#[derive(Debug, Clone)]
pub struct CookieSessionProvider {
    sessions: Arc<SessionManager>,
}

impl CookieSessionProvider {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl IdentityProvider for CookieSessionProvider {
    fn name(&self) -> &'static str {
        "cookie"
    }

    async fn identify(&self, jar: &CookieJar) -> Option<Identity> {
        let claims = self.sessions.current(jar).await?;
        Identity::from_claims(claims, IdentitySource::Cookie)
    }
}

/// Identity resolved for the current request, stored in its extensions.
/// `None` means the request was resolved and is anonymous.
#[derive(Debug, Clone)]
pub struct RequestIdentity(pub Option<Arc<Identity>>);

/// Tries identity providers in order
#[derive(Clone)]
pub struct IdentityResolver {
    providers: Vec<Arc<dyn IdentityProvider>>,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("IdentityResolver")
            .field("providers", &names)
            .finish()
    }
}

impl IdentityResolver {
    /// Providers are consulted in the given order
    pub fn new(providers: Vec<Arc<dyn IdentityProvider>>) -> Self {
        Self { providers }
    }

    /// The standard order: OAuth session, then cookie session
    pub fn standard(oauth: OAuthSessionProvider, cookie: CookieSessionProvider) -> Self {
        Self::new(vec![Arc::new(oauth), Arc::new(cookie)])
    }

    /// First identity any provider finds, or `None` for an anonymous request
    pub async fn resolve(&self, jar: &CookieJar) -> Option<Identity> {
        for provider in &self.providers {
            if let Some(identity) = provider.identify(jar).await {
                tracing::trace!(
                    "Resolved subject {} via {} session",
                    identity.subject_id,
                    provider.name()
                );
                return Some(identity);
            }
        }
        None
    }

    /// Resolve once per request. Later calls reuse the memoized result.
    pub async fn resolve_parts(&self, parts: &mut Parts) -> Option<Arc<Identity>> {
        if let Some(RequestIdentity(identity)) = parts.extensions.get::<RequestIdentity>() {
            return identity.clone();
        }

        let jar = CookieJar::from_headers(&parts.headers);
        let identity = self.resolve(&jar).await.map(Arc::new);
        parts.extensions.insert(RequestIdentity(identity.clone()));
        identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use axum::http::{header, HeaderValue, Request};
    use chrono::Duration;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SESSION_SECRET: &str = "identity-session-secret-identity-session";
    const OAUTH_SECRET: &str = "identity-oauth-secret-identity-oauth-sec";

    fn sessions() -> Arc<SessionManager> {
        let codec = TokenCodec::new(&SecretString::from(SESSION_SECRET));
        Arc::new(SessionManager::new(codec, &SessionConfig::default()))
    }

    fn oauth_provider() -> OAuthSessionProvider {
        OAuthSessionProvider::new(
            TokenCodec::new(&SecretString::from(OAUTH_SECRET)),
            &["Boss@Example.com".to_string()],
            Duration::hours(24),
            true,
        )
    }

    fn resolver() -> IdentityResolver {
        IdentityResolver::standard(oauth_provider(), CookieSessionProvider::new(sessions()))
    }

    fn github_profile(email: &str) -> OAuthProfile {
        OAuthProfile {
            provider: "github".to_string(),
            account_id: "1001".to_string(),
            name: Some("octocat".to_string()),
            email: Some(email.to_string()),
        }
    }

    /// Request jar carrying every cookie queued on `jar`
    fn request_jar(jar: &CookieJar) -> CookieJar {
        let mut headers = axum::http::HeaderMap::new();
        let cookie = jar
            .pending()
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn test_map_profile_roles() {
        let provider = oauth_provider();

        let admin = provider.map_profile(&github_profile("boss@example.com"));
        assert_eq!(admin.role(), UserRole::Admin);
        assert_eq!(admin.subject_id, "github:1001");
        assert_eq!(admin.display_name, "octocat");

        let user = provider.map_profile(&github_profile("someone@example.com"));
        assert_eq!(user.role, "user");

        let anonymous = provider.map_profile(&OAuthProfile {
            provider: "google".to_string(),
            account_id: "7".to_string(),
            ..Default::default()
        });
        assert_eq!(anonymous.role(), UserRole::User);
        assert_eq!(anonymous.email, "");
    }

    #[tokio::test]
    async fn test_anonymous_request_resolves_to_none() {
        assert!(resolver().resolve(&CookieJar::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_cookie_session_resolves() {
        let mut jar = CookieJar::new();
        sessions().create(&mut jar, "42", "Alice", "alice@example.com").unwrap();

        let identity = resolver().resolve(&request_jar(&jar)).await.unwrap();
        assert_eq!(identity.subject_id, "42");
        assert_eq!(identity.source, IdentitySource::Cookie);
        assert_eq!(identity.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_oauth_session_takes_precedence() {
        let mut jar = CookieJar::new();
        sessions().create(&mut jar, "42", "Alice", "alice@example.com").unwrap();
        oauth_provider().issue(&mut jar, &github_profile("boss@example.com")).unwrap();

        let identity = resolver().resolve(&request_jar(&jar)).await.unwrap();
        assert_eq!(identity.subject_id, "github:1001");
        assert_eq!(identity.source, IdentitySource::OAuth);
        assert!(identity.is_admin());
    }

    #[tokio::test]
    async fn test_invalid_oauth_token_falls_through_to_cookie() {
        let mut jar = CookieJar::new();
        sessions().create(&mut jar, "42", "Alice", "").unwrap();
        // Signed under the session secret, not the OAuth secret
        let forged = TokenCodec::new(&SecretString::from(SESSION_SECRET))
            .encode(&SessionClaims::new("github:1", "x", "", Duration::hours(1)))
            .unwrap();
        jar.add(SetCookie::new("__Secure-oauth.session-token", forged));

        let identity = resolver().resolve(&request_jar(&jar)).await.unwrap();
        assert_eq!(identity.source, IdentitySource::Cookie);
    }

    #[tokio::test]
    async fn test_cookie_session_token_is_not_an_oauth_token() {
        let shared = SecretString::from(SESSION_SECRET);
        let sessions = Arc::new(SessionManager::new(TokenCodec::new(&shared), &SessionConfig::default()));
        let oauth = OAuthSessionProvider::new(TokenCodec::new(&shared), &[], Duration::hours(1), true);
        let resolver = IdentityResolver::standard(oauth, CookieSessionProvider::new(sessions.clone()));

        let mut issued = CookieJar::new();
        let token = sessions.create(&mut issued, "42", "Alice", "").unwrap();

        let mut jar = CookieJar::new();
        jar.add(SetCookie::new("oauth.session-token", token));
        assert!(resolver.resolve(&request_jar(&jar)).await.is_none());
    }

    #[tokio::test]
    async fn test_revoked_oauth_token_is_anonymous() {
        let list = RevocationList::new(std::time::Duration::from_secs(60));
        let provider = oauth_provider().with_revocation(list.clone());

        let mut jar = CookieJar::new();
        let claims = provider.issue(&mut jar, &github_profile("someone@example.com")).unwrap();
        let request = request_jar(&jar);
        assert!(provider.identify(&request).await.is_some());

        list.revoke(&claims).await;
        assert!(provider.identify(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_blank_subject_is_anonymous() {
        let mut jar = CookieJar::new();
        sessions().create(&mut jar, "", "Nobody", "").unwrap();

        assert!(resolver().resolve(&request_jar(&jar)).await.is_none());
    }

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn identify(&self, _jar: &CookieJar) -> Option<Identity> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(Identity {
                subject_id: "7".to_string(),
                email: String::new(),
                display_name: String::new(),
                role: UserRole::User,
                source: IdentitySource::Cookie,
                token_id: String::new(),
                expires_at: 0,
            })
        }
    }

    #[tokio::test]
    async fn test_resolution_is_memoized_per_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = IdentityResolver::new(vec![Arc::new(CountingProvider {
            calls: calls.clone(),
        })]);

        let (mut parts, _) = Request::builder().uri("/content").body(()).unwrap().into_parts();
        let first = resolver.resolve_parts(&mut parts).await.unwrap();
        let second = resolver.resolve_parts(&mut parts).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_anonymous_result_is_memoized() {
        let (mut parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        assert!(resolver().resolve_parts(&mut parts).await.is_none());
        assert!(matches!(
            parts.extensions.get::<RequestIdentity>(),
            Some(RequestIdentity(None))
        ));
    }
}
