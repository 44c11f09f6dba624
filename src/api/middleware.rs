//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type used by every handler
//! - The route authorizer that gates page requests on the session
//! - Identity extractors for handlers

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::cache::RevocationList;
use crate::config::{Config, RoutesConfig};
use crate::db::repositories::{SqlxContentRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::services::{
    CatalogError, CatalogService, CookieSessionProvider, Identity, IdentityResolver,
    OAuthSessionProvider, SessionManager, TokenCodec, TokenError, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub identity: Arc<IdentityResolver>,
    pub user_service: Arc<UserService>,
    pub catalog: Arc<CatalogService>,
}

impl AppState {
    /// Wire services from a validated configuration and an open pool.
    ///
    /// Fails only when no signing secret is configured.
    pub fn new(config: Config, pool: DynDatabasePool) -> Result<Self, TokenError> {
        let session_codec = TokenCodec::try_new(config.session.secret.as_ref())?;
        let oauth_codec = TokenCodec::try_new(config.oauth_secret())?;

        let revocations = RevocationList::from_config(&config.session);

        let mut sessions = SessionManager::new(session_codec, &config.session);
        let mut oauth = OAuthSessionProvider::new(
            oauth_codec,
            &config.oauth.admin_emails,
            config.session.ttl(),
            config.session.secure_cookies,
        );
        if let Some(list) = revocations {
            tracing::info!("Session revocation list enabled");
            sessions = sessions.with_revocation(list.clone());
            oauth = oauth.with_revocation(list);
        }
        let sessions = Arc::new(sessions);

        let identity = IdentityResolver::standard(oauth, CookieSessionProvider::new(sessions.clone()));

        Ok(Self {
            user_service: Arc::new(UserService::new(SqlxUserRepository::boxed(pool.clone()))),
            catalog: Arc::new(CatalogService::new(SqlxContentRepository::boxed(pool.clone()))),
            pool,
            config: Arc::new(config),
            sessions,
            identity: Arc::new(identity),
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        let message = err.to_string();
        match err {
            UserServiceError::ValidationError(errors) => Self::with_details(
                "VALIDATION_ERROR",
                message,
                serde_json::json!({ "errors": errors }),
            ),
            UserServiceError::UserExists(errors) => {
                Self::with_details("CONFLICT", message, serde_json::json!({ "errors": errors }))
            }
            UserServiceError::AuthenticationError(errors) => Self::with_details(
                "UNAUTHORIZED",
                message,
                serde_json::json!({ "errors": errors }),
            ),
            UserServiceError::Unauthorized(message) => Self::unauthorized(message),
            UserServiceError::NotFound => Self::not_found(message),
            UserServiceError::InternalError(e) => {
                tracing::error!("Internal error: {:#}", e);
                Self::internal_error("Internal server error")
            }
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ValidationError(message) => Self::validation_error(message),
            CatalogError::InternalError(e) => {
                tracing::error!("Internal error: {:#}", e);
                Self::internal_error("Internal server error")
            }
        }
    }
}

// ============================================================================
// Route authorization
// ============================================================================

/// How the authorizer treats a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Requires a signed-in principal
    Protected,
    /// Reserved for anonymous visitors
    Public,
    Neither,
}

/// Outcome of authorizing a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectToLogin,
    RedirectToHome,
}

/// `/content/` and `/content` are the same route
fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

fn is_under(path: &str, root: &str) -> bool {
    let root = normalize(root);
    path == root || path.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
}

/// Paths the authorizer never runs on: anything under an excluded prefix, and
/// asset-extension files outside the protected roots.
pub fn is_excluded(routes: &RoutesConfig, path: &str) -> bool {
    if routes
        .excluded_prefixes
        .iter()
        .any(|prefix| is_under(path, prefix))
    {
        return true;
    }
    if classify(routes, path) == RouteClass::Protected {
        return false;
    }
    let lower = path.to_ascii_lowercase();
    routes
        .excluded_extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
}

pub fn classify(routes: &RoutesConfig, path: &str) -> RouteClass {
    let path = normalize(path);
    if routes.protected_roots.iter().any(|root| is_under(path, root)) {
        RouteClass::Protected
    } else if routes.public_paths.iter().any(|p| normalize(p) == path) {
        RouteClass::Public
    } else {
        RouteClass::Neither
    }
}

/// The authorization table
pub fn decide(class: RouteClass, authenticated: bool) -> Decision {
    match (class, authenticated) {
        (RouteClass::Protected, false) => Decision::RedirectToLogin,
        (RouteClass::Public, true) => Decision::RedirectToHome,
        _ => Decision::Allow,
    }
}

/// Decision for a path, never redirecting a signed-in visitor to the page
/// they are already on
pub fn route_decision(routes: &RoutesConfig, path: &str, authenticated: bool) -> Decision {
    if authenticated && normalize(path) == normalize(&routes.home_path) {
        return Decision::Allow;
    }
    decide(classify(routes, path), authenticated)
}

/// Route authorizer middleware.
///
/// Resolves the identity once (memoized in the request extensions) for
/// protected and public routes and applies [`route_decision`]. Never touches
/// the database.
pub async fn authorize(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let routes = &state.config.routes;
    let path = request.uri().path().to_string();

    if is_excluded(routes, &path) || classify(routes, &path) == RouteClass::Neither {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let identity = state.identity.resolve_parts(&mut parts).await;

    match route_decision(routes, &path, identity.is_some()) {
        Decision::Allow => next.run(Request::from_parts(parts, body)).await,
        Decision::RedirectToLogin => {
            tracing::debug!("Anonymous request to {} redirected to login", path);
            Redirect::temporary(&routes.login_path).into_response()
        }
        Decision::RedirectToHome => {
            tracing::debug!("Signed-in request to {} redirected home", path);
            Redirect::temporary(&routes.home_path).into_response()
        }
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// Identity of the current request, `None` when anonymous.
///
/// Reuses the authorizer's result when it ran; resolves (once) otherwise.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Option<Arc<Identity>>);

impl FromRequestParts<AppState> for CurrentIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(state.identity.resolve_parts(parts).await))
    }
}

/// Identity of a signed-in principal; 401 otherwise
#[derive(Debug, Clone)]
pub struct RequireIdentity(pub Arc<Identity>);

impl FromRequestParts<AppState> for RequireIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .identity
            .resolve_parts(parts)
            .await
            .map(Self)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Identity of a signed-in administrator; 401 or 403 otherwise
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub Arc<Identity>);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireIdentity(identity) = RequireIdentity::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            return Err(ApiError::forbidden("Admin privileges required"));
        }
        Ok(Self(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> RoutesConfig {
        RoutesConfig::default()
    }

    #[test]
    fn test_excluded_paths() {
        let routes = routes();
        assert!(is_excluded(&routes, "/api"));
        assert!(is_excluded(&routes, "/api/content"));
        assert!(is_excluded(&routes, "/static/app.css"));
        assert!(is_excluded(&routes, "/images/poster"));
        assert!(is_excluded(&routes, "/favicon.ico"));
        assert!(is_excluded(&routes, "/LOGO.PNG"));

        // Asset extensions never open up a protected root
        assert!(!is_excluded(&routes, "/content/poster.png"));
        assert!(!is_excluded(&routes, "/content/anything.css"));
        assert!(!is_excluded(&routes, "/user/profile.js"));

        assert!(!is_excluded(&routes, "/apiary"));
        assert!(!is_excluded(&routes, "/content"));
        assert!(!is_excluded(&routes, "/"));
    }

    #[test]
    fn test_classify() {
        let routes = routes();
        assert_eq!(classify(&routes, "/content"), RouteClass::Protected);
        assert_eq!(classify(&routes, "/content/"), RouteClass::Protected);
        assert_eq!(classify(&routes, "/content/42"), RouteClass::Protected);
        assert_eq!(classify(&routes, "/user"), RouteClass::Protected);
        assert_eq!(classify(&routes, "/user/settings"), RouteClass::Protected);

        assert_eq!(classify(&routes, "/"), RouteClass::Public);
        assert_eq!(classify(&routes, "/login"), RouteClass::Public);
        assert_eq!(classify(&routes, "/signup"), RouteClass::Public);

        assert_eq!(classify(&routes, "/contents"), RouteClass::Neither);
        assert_eq!(classify(&routes, "/users"), RouteClass::Neither);
        assert_eq!(classify(&routes, "/about"), RouteClass::Neither);
        assert_eq!(classify(&routes, "/login/help"), RouteClass::Neither);
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(decide(RouteClass::Protected, false), Decision::RedirectToLogin);
        assert_eq!(decide(RouteClass::Protected, true), Decision::Allow);
        assert_eq!(decide(RouteClass::Public, true), Decision::RedirectToHome);
        assert_eq!(decide(RouteClass::Public, false), Decision::Allow);
        assert_eq!(decide(RouteClass::Neither, true), Decision::Allow);
        assert_eq!(decide(RouteClass::Neither, false), Decision::Allow);
    }

    #[test]
    fn test_home_path_never_redirects_to_itself() {
        let mut routes = routes();
        routes.home_path = "/".to_string();

        assert_eq!(route_decision(&routes, "/", true), Decision::Allow);
        assert_eq!(route_decision(&routes, "/login", true), Decision::RedirectToHome);
        assert_eq!(route_decision(&routes, "/", false), Decision::Allow);
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::new("CONFLICT", "x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::internal_error("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_user_service_errors_map_to_api_errors() {
        use crate::services::FieldErrors;

        let err: ApiError =
            UserServiceError::ValidationError(FieldErrors::single("email", "Please enter a valid email.")).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let details = err.error.details.unwrap();
        assert_eq!(details["errors"]["email"][0], "Please enter a valid email.");

        let err: ApiError = UserServiceError::UserExists(FieldErrors::single("username", "taken")).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: ApiError = UserServiceError::NotFound.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = UserServiceError::InternalError(anyhow::anyhow!("db down")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.error.message.contains("db down"));
    }
}
