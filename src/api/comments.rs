//! Comment API endpoints
//!
//! - GET, PUT, PATCH, DELETE /api/v1/comments/{id}/ - One comment and its replies
//! - POST /api/v1/comments/{id}/approve/, /comments/{id}/disapprove/ - Moderation (staff)
//!
//! Listing and posting comments hang off the post, see `blogs`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::common::{route_slashed, ApiJson, ApiPath};
use crate::api::middleware::{require_staff, ApiError, AppState, AuthenticatedUser};
use crate::models::CommentNode;
use crate::services::comment::CommentServiceError;

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            CommentServiceError::NotFound(_) => ApiError::not_found("Not found."),
            CommentServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            CommentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CommentServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

/// Request body for editing a comment
#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

/// Build the comment router
pub fn router() -> Router<AppState> {
    let router = Router::new();
    let router = route_slashed(
        router,
        "/comments/{id}",
        get(get_comment)
            .put(update_comment)
            .patch(update_comment)
            .delete(delete_comment),
    );
    let router = route_slashed(router, "/comments/{id}/approve", post(approve_comment));
    route_slashed(router, "/comments/{id}/disapprove", post(disapprove_comment))
}

/// GET /api/v1/comments/{id}/
async fn get_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<CommentNode>, ApiError> {
    Ok(Json(state.comment_service.get(&user, id).await?))
}

/// PUT or PATCH /api/v1/comments/{id}/
async fn update_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateCommentRequest>,
) -> Result<Json<CommentNode>, ApiError> {
    let comment = state
        .comment_service
        .update(&user, id, &body.content)
        .await?;
    Ok(Json(comment))
}

/// DELETE /api/v1/comments/{id}/
async fn delete_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.comment_service.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/comments/{id}/approve/
async fn approve_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<CommentNode>, ApiError> {
    require_staff(&user)?;
    Ok(Json(state.comment_service.moderate(id, true).await?))
}

/// POST /api/v1/comments/{id}/disapprove/
async fn disapprove_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<CommentNode>, ApiError> {
    require_staff(&user)?;
    Ok(Json(state.comment_service.moderate(id, false).await?))
}
