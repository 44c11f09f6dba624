//! Catalog API endpoints
//!
//! - GET /api/content - Paged, filterable content listing
//! - GET /api/content/{id} - A single title
//! - POST /api/content - Add a title (admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, RequireAdmin};
use crate::models::{Content, ContentPage, ContentQuery, ContentSort};
use crate::services::NewContentInput;

/// Query parameters for the listing.
///
/// Everything arrives as text; unusable values fall back to defaults rather
/// than rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListContentParams {
    pub content_type: Option<String>,
    pub query: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListContentParams {
    pub fn into_query(self) -> ContentQuery {
        let defaults = ContentQuery::default();
        ContentQuery {
            content_type: non_blank(self.content_type),
            search: non_blank(self.query),
            sort: self
                .sort
                .as_deref()
                .map(ContentSort::parse)
                .unwrap_or_default(),
            page: parse_or(self.page, defaults.page),
            limit: parse_or(self.limit, defaults.limit),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or(value: Option<String>, default: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_content).post(create_content))
        .route("/{id}", get(get_content))
}

/// GET /api/content
async fn list_content(
    State(state): State<AppState>,
    Query(params): Query<ListContentParams>,
) -> Result<Json<ContentPage>, ApiError> {
    let page = state
        .catalog
        .browse(params.into_query())
        .await
        .map_err(|e| {
            tracing::error!("Failed to browse catalog: {:#}", e);
            ApiError::internal_error("Failed to fetch content")
        })?;

    Ok(Json(page))
}

/// GET /api/content/{id}
async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Content>, ApiError> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::validation_error("Invalid content ID"))?;

    state
        .catalog
        .get(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load content {}: {:#}", id, e);
            ApiError::internal_error("Failed to fetch content")
        })?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Content not found"))
}

#[derive(Debug, Serialize)]
pub struct ContentResponse {
    pub content: Content,
}

/// POST /api/content
async fn create_content(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<NewContentInput>,
) -> Result<impl IntoResponse, ApiError> {
    let content = state.catalog.create(body).await?;
    tracing::debug!("Content {} added by {}", content.id, admin.subject_id);

    Ok((StatusCode::CREATED, Json(ContentResponse { content })))
}
