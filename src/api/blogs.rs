//! Blog API endpoints
//!
//! Handles HTTP requests for posts and what hangs off them:
//! - GET /api/v1/blogs/ - Published posts with filters
//! - POST /api/v1/blogs/create/ - Create a post
//! - GET /api/v1/blogs/featured/, /blogs/popular/, /blogs/search/ - Special lists
//! - GET /api/v1/blogs/{slug}/ - Post detail, counts a view
//! - PUT, PATCH /api/v1/blogs/{slug}/update/ - Edit a post (author only)
//! - DELETE /api/v1/blogs/{slug}/delete/ - Delete a post (author only)
//! - POST, DELETE /api/v1/blogs/{slug}/like/ - Like or unlike
//! - GET, POST /api/v1/blogs/{slug}/comments/ - Comment tree and new comments

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::common::{route_slashed, ApiJson, ApiPath, ApiQuery, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};
use crate::api::responses::{LikeResponse, PaginatedResponse};
use crate::models::{
    default_blog_ordering, split_tags, BlogDetail, BlogListItem, BlogOrdering, BlogQuery,
    CommentNode, CreateBlogInput, UpdateBlogInput,
};
use crate::services::blog::{BlogSearch, BlogServiceError};
use crate::services::comment::CreateCommentInput;
use crate::services::like::{LikeOutcome, LikeServiceError};

impl From<BlogServiceError> for ApiError {
    fn from(err: BlogServiceError) -> Self {
        match err {
            BlogServiceError::NotFound(_) => ApiError::not_found("Not found."),
            BlogServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            BlogServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            BlogServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<LikeServiceError> for ApiError {
    fn from(err: LikeServiceError) -> Self {
        match err {
            LikeServiceError::NotFound(_) => ApiError::not_found("Not found."),
            LikeServiceError::NotLiked => ApiError::not_found("Blog not liked"),
            LikeServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

/// Query parameters for the published list
#[derive(Debug, Default, Deserialize)]
pub struct BlogListQuery {
    pub category: Option<Uuid>,
    pub author: Option<Uuid>,
    /// Alias of `author`
    pub author_id: Option<Uuid>,
    pub is_featured: Option<bool>,
    pub search: Option<String>,
    /// Comma separated; every tag must match
    pub tags: Option<String>,
    pub ordering: Option<String>,
}

impl BlogListQuery {
    fn into_query(self) -> BlogQuery {
        BlogQuery {
            category_id: self.category,
            author_id: self.author.or(self.author_id),
            is_featured: self.is_featured,
            search: self.search,
            tags: self.tags.as_deref().map(split_tags).unwrap_or_default(),
            ordering: BlogOrdering::parse_or(self.ordering.as_deref(), default_blog_ordering()),
            ..BlogQuery::published()
        }
    }
}

/// Query parameters for search
#[derive(Debug, Default, Deserialize)]
pub struct BlogSearchQuery {
    pub q: Option<String>,
    /// Substring of the category name
    pub category: Option<String>,
    /// Substring of the author's username or names
    pub author: Option<String>,
    pub tags: Option<String>,
}

impl From<BlogSearchQuery> for BlogSearch {
    fn from(query: BlogSearchQuery) -> Self {
        BlogSearch {
            q: query.q,
            category: query.category,
            author: query.author,
            tags: query.tags.as_deref().map(split_tags).unwrap_or_default(),
        }
    }
}

/// Build the blog router
pub fn router() -> Router<AppState> {
    let router = Router::new();
    let router = route_slashed(router, "/blogs", get(list_blogs));
    let router = route_slashed(router, "/blogs/create", post(create_blog));
    let router = route_slashed(router, "/blogs/featured", get(featured_blogs));
    let router = route_slashed(router, "/blogs/popular", get(popular_blogs));
    let router = route_slashed(router, "/blogs/search", get(search_blogs));
    let router = route_slashed(router, "/blogs/{slug}", get(get_blog));
    let router = route_slashed(
        router,
        "/blogs/{slug}/update",
        put(update_blog).patch(update_blog),
    );
    let router = route_slashed(router, "/blogs/{slug}/delete", delete(delete_blog));
    let router = route_slashed(router, "/blogs/{slug}/like", post(like_blog).delete(unlike_blog));
    route_slashed(
        router,
        "/blogs/{slug}/comments",
        get(list_comments).post(create_comment),
    )
}

/// GET /api/v1/blogs/
async fn list_blogs(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PaginationQuery>,
    ApiQuery(query): ApiQuery<BlogListQuery>,
) -> Result<Json<PaginatedResponse<BlogListItem>>, ApiError> {
    let result = state
        .blog_service
        .list_published(query.into_query(), &page.params())
        .await?;
    Ok(Json(result.into()))
}

/// POST /api/v1/blogs/create/
async fn create_blog(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<CreateBlogInput>,
) -> Result<(StatusCode, Json<BlogDetail>), ApiError> {
    let blog = state.blog_service.create(&user, body).await?;
    Ok((StatusCode::CREATED, Json(blog)))
}

/// GET /api/v1/blogs/featured/
async fn featured_blogs(
    State(state): State<AppState>,
) -> Result<Json<Vec<BlogListItem>>, ApiError> {
    Ok(Json(state.blog_service.featured().await?))
}

/// GET /api/v1/blogs/popular/
async fn popular_blogs(State(state): State<AppState>) -> Result<Json<Vec<BlogListItem>>, ApiError> {
    Ok(Json(state.blog_service.popular().await?))
}

/// GET /api/v1/blogs/search/
async fn search_blogs(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PaginationQuery>,
    ApiQuery(query): ApiQuery<BlogSearchQuery>,
) -> Result<Json<PaginatedResponse<BlogListItem>>, ApiError> {
    let result = state
        .blog_service
        .search(query.into(), &page.params())
        .await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/blogs/{slug}/
async fn get_blog(
    State(state): State<AppState>,
    OptionalUser(viewer): OptionalUser,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<BlogDetail>, ApiError> {
    let blog = state
        .blog_service
        .get_for_viewer(&slug, viewer.as_ref())
        .await?;
    Ok(Json(blog))
}

/// PUT or PATCH /api/v1/blogs/{slug}/update/
async fn update_blog(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(slug): ApiPath<String>,
    ApiJson(body): ApiJson<UpdateBlogInput>,
) -> Result<Json<BlogDetail>, ApiError> {
    let blog = state.blog_service.update(&user, &slug, body).await?;
    Ok(Json(blog))
}

/// DELETE /api/v1/blogs/{slug}/delete/
async fn delete_blog(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(slug): ApiPath<String>,
) -> Result<StatusCode, ApiError> {
    state.blog_service.delete(&user, &slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/blogs/{slug}/like/
///
/// 201 for a new like, 200 when the user had already liked the post.
async fn like_blog(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(slug): ApiPath<String>,
) -> Result<(StatusCode, Json<LikeResponse>), ApiError> {
    let result = state.like_service.like(&user, &slug).await?;
    let (status, message) = match result.outcome {
        LikeOutcome::Created => (StatusCode::CREATED, "Blog liked successfully"),
        LikeOutcome::AlreadyLiked => (StatusCode::OK, "Blog already liked"),
    };
    Ok((
        status,
        Json(LikeResponse {
            message: message.to_string(),
            likes_count: result.likes_count,
        }),
    ))
}

/// DELETE /api/v1/blogs/{slug}/like/
async fn unlike_blog(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<LikeResponse>, ApiError> {
    let likes_count = state.like_service.unlike(&user, &slug).await?;
    Ok(Json(LikeResponse {
        message: "Blog unliked successfully".to_string(),
        likes_count,
    }))
}

/// GET /api/v1/blogs/{slug}/comments/
async fn list_comments(
    State(state): State<AppState>,
    OptionalUser(viewer): OptionalUser,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<Vec<CommentNode>>, ApiError> {
    let comments = state
        .comment_service
        .list_for_blog(&slug, viewer.as_ref())
        .await?;
    Ok(Json(comments))
}

/// POST /api/v1/blogs/{slug}/comments/
async fn create_comment(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiPath(slug): ApiPath<String>,
    ApiJson(body): ApiJson<CreateCommentInput>,
) -> Result<(StatusCode, Json<CommentNode>), ApiError> {
    let comment = state.comment_service.create(&user, &slug, body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlogSortField, BlogStatus, SortOrder};

    #[test]
    fn test_list_query_conversion() {
        let author = Uuid::new_v4();
        let query = BlogListQuery {
            author_id: Some(author),
            tags: Some("rust, axum,".into()),
            ordering: Some("-likes_count".into()),
            ..Default::default()
        }
        .into_query();

        assert_eq!(query.status, Some(BlogStatus::Published));
        assert_eq!(query.author_id, Some(author));
        assert_eq!(query.tags, vec!["rust", "axum"]);
        assert_eq!(query.ordering, SortOrder::desc(BlogSortField::LikesCount));
    }

    #[test]
    fn test_list_query_author_takes_precedence() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let query = BlogListQuery {
            author: Some(a),
            author_id: Some(b),
            ordering: Some("nonsense".into()),
            ..Default::default()
        }
        .into_query();
        assert_eq!(query.author_id, Some(a));
        assert_eq!(query.ordering, default_blog_ordering());
    }
}
