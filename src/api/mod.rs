//! API layer - HTTP handlers and routing
//!
//! - Auth endpoints (signup, login, logout, refresh)
//! - User endpoints (current session, admin listing, password change)
//! - Catalog endpoints
//! - Page routes, gated by the route authorizer

pub mod auth;
pub mod content;
pub mod middleware;
pub mod pages;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::post,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{
    authorize, classify, decide, is_excluded, route_decision, ApiError, AppState, CurrentIdentity,
    Decision, RequireAdmin, RequireIdentity, RouteClass,
};

/// Build the router for everything under /api
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/user", auth::user_router())
        .route("/change-password", post(auth::change_password))
        .nest("/content", content::router())
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .nest("/api", build_api_router())
        .merge(pages::router())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::authorize,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured front-end origin, with cookie credentials
fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::COOKIE])
        .allow_credentials(true);

    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
            cors
        }
    }
}
