//! Authentication API endpoints
//!
//! - POST /api/auth/signup - Account registration
//! - POST /api/auth/login - Credential login, starts the cookie session
//! - POST /api/auth/logout - Ends every session the browser holds
//! - POST /api/auth/refresh - Extends the cookie session
//! - GET /api/user/session - Current identity, or null
//! - GET /api/user/all - Every account (admin)
//! - PATCH /api/user/{id} - Edit an account (admin)
//! - DELETE /api/user/{id} - Delete an account (admin)
//! - POST /api/change-password - Change the signed-in user's password

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, CurrentIdentity, RequireAdmin};
use crate::models::{SessionClaims, UserSummary};
use crate::services::{
    CookieJar, Identity, IdentitySource, LoginInput, SignupInput, UpdateUserInput,
};

/// Request body for a password change
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default, alias = "old_password")]
    pub old_password: String,
    #[serde(default, alias = "new_password")]
    pub new_password: String,
}

/// Response carrying an account
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub message: String,
    pub user: UserSummary,
}

/// Response for a session operation
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub message: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Routes under /api/auth
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
}

/// Routes under /api/user
pub fn user_router() -> Router<AppState> {
    Router::new()
        .route("/session", get(current_session))
        .route("/all", get(list_users))
        .route("/{id}", patch(update_user).delete(delete_user))
}

/// POST /api/auth/signup
///
/// Creates the account without signing in.
async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.signup(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            message: "Account created successfully!".to_string(),
            user: user.into(),
        }),
    ))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    mut jar: CookieJar,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.login(body).await?;

    let claims = SessionClaims::new(
        user.subject_id(),
        user.username.clone(),
        user.email.clone(),
        state.sessions.ttl(),
    )
    .with_role(user.role);

    state.sessions.issue(&mut jar, &claims).map_err(|e| {
        tracing::error!("Failed to issue session for user {}: {}", user.id, e);
        ApiError::internal_error("Failed to start session")
    })?;

    tracing::info!("User {} logged in", user.id);

    Ok((
        jar,
        Json(AccountResponse {
            message: "Logged in successfully".to_string(),
            user: user.into(),
        }),
    ))
}

/// POST /api/auth/logout
///
/// Always succeeds. Clears the session and provider cookies and, when the
/// revocation list is on, denies both session tokens for the rest of their
/// lifetime.
async fn logout(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    mut jar: CookieJar,
) -> impl IntoResponse {
    if let Some(claims) = state.sessions.current(&jar).await {
        state.sessions.revoke(&claims).await;
        tracing::debug!("Logged out subject {}", claims.subject_id);
    }
    if let (Some(identity), Some(revocations)) = (identity, state.sessions.revocations()) {
        if identity.source == IdentitySource::OAuth {
            revocations
                .revoke_id(&identity.token_id, identity.expires_at)
                .await;
        }
    }
    state.sessions.destroy(&mut jar);

    (jar, MessageResponse::new("Logged out successfully"))
}

/// POST /api/auth/refresh
async fn refresh(
    State(state): State<AppState>,
    mut jar: CookieJar,
) -> Result<(CookieJar, Json<SessionResponse>), (CookieJar, ApiError)> {
    match state.sessions.refresh(&mut jar).await {
        Some(claims) => Ok((
            jar,
            Json(SessionResponse {
                message: "Session refreshed".to_string(),
                expires_at: claims.expires_at,
            }),
        )),
        None => Err((jar, ApiError::unauthorized("Session is invalid or expired"))),
    }
}

/// GET /api/user/session
async fn current_session(CurrentIdentity(identity): CurrentIdentity) -> impl IntoResponse {
    Json(identity.map(|identity| Identity::clone(&identity)))
}

/// GET /api/user/all
async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    tracing::debug!("User listing requested by {}", admin.subject_id);
    let users = state.user_service.list_users().await?;
    Ok(Json(users.into_iter().map(UserSummary::from).collect()))
}

/// PATCH /api/user/{id}
async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserInput>,
) -> Result<Json<UserSummary>, ApiError> {
    let id = parse_user_id(&id)?;
    let user = state.user_service.update_user(id, body).await?;
    Ok(Json(user.into()))
}

/// DELETE /api/user/{id}
async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_user_id(&id)?;
    state.user_service.delete_user(id).await?;
    tracing::info!("User {} deleted by {}", id, admin.subject_id);
    Ok(MessageResponse::new("User deleted successfully"))
}

fn parse_user_id(id: &str) -> Result<i64, ApiError> {
    id.parse()
        .map_err(|_| ApiError::validation_error("Invalid user ID"))
}

/// POST /api/change-password
pub async fn change_password(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .user_service
        .change_password(identity.as_deref(), &body.old_password, &body.new_password)
        .await?;

    Ok(MessageResponse::new("Password updated successfully"))
}
