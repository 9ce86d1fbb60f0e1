//! Public user directory endpoints
//!
//! - GET /api/v1/users/ - Active users, searchable and paginated
//! - GET /api/v1/users/{id}/ - Public profile of one active user
//! - GET /api/v1/users/{id}/blogs/ - Posts by one user

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::common::{route_slashed, ApiPath, ApiQuery, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, OptionalUser};
use crate::api::responses::PaginatedResponse;
use crate::models::{
    BlogListItem, BlogOrdering, BlogStatus, PublicProfile, SortOrder, UserOrdering, UserQuery,
    UserSortField,
};
use crate::services::blog::UserBlogFilter;

/// Query parameters for the user directory
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub location: Option<String>,
    pub username: Option<String>,
    pub ordering: Option<String>,
}

impl UserListQuery {
    fn into_query(self) -> UserQuery {
        UserQuery {
            search: self.search,
            location: self.location,
            username: self.username,
            ordering: UserOrdering::parse_or(
                self.ordering.as_deref(),
                SortOrder::desc(UserSortField::CreatedAt),
            ),
        }
    }
}

/// Query parameters for one user's posts
#[derive(Debug, Default, Deserialize)]
pub struct UserBlogsQuery {
    pub status: Option<String>,
    pub is_featured: Option<bool>,
    pub ordering: Option<String>,
}

impl UserBlogsQuery {
    fn into_filter(self) -> Result<UserBlogFilter, ApiError> {
        let status = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(BlogStatus::parse(raw).ok_or_else(|| {
                ApiError::validation_error(format!("Unknown status: {}", raw))
            })?),
            None => None,
        };
        Ok(UserBlogFilter {
            status,
            is_featured: self.is_featured,
            ordering: self.ordering.as_deref().and_then(BlogOrdering::parse),
        })
    }
}

/// Build the users router
pub fn router() -> Router<AppState> {
    let router = Router::new();
    let router = route_slashed(router, "/users", get(list_users));
    let router = route_slashed(router, "/users/{id}", get(get_user));
    route_slashed(router, "/users/{id}/blogs", get(list_user_blogs))
}

/// GET /api/v1/users/
async fn list_users(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PaginationQuery>,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<Json<PaginatedResponse<PublicProfile>>, ApiError> {
    let result = state
        .user_service
        .list_users(&query.into_query(), &page.params())
        .await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/users/{id}/
async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<PublicProfile>, ApiError> {
    let profile = state.user_service.get_user(id).await?;
    Ok(Json(profile))
}

/// GET /api/v1/users/{id}/blogs/
///
/// The owner sees drafts and archived posts too.
async fn list_user_blogs(
    State(state): State<AppState>,
    OptionalUser(viewer): OptionalUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(page): ApiQuery<PaginationQuery>,
    ApiQuery(query): ApiQuery<UserBlogsQuery>,
) -> Result<Json<PaginatedResponse<BlogListItem>>, ApiError> {
    let filter = query.into_filter()?;
    let result = state
        .blog_service
        .list_by_user(id, viewer.as_ref(), filter, &page.params())
        .await?;
    Ok(Json(result.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlogSortField;

    #[test]
    fn test_user_query_ordering_fallback() {
        let query = UserListQuery {
            ordering: Some("bogus".into()),
            ..Default::default()
        }
        .into_query();
        assert_eq!(query.ordering, SortOrder::desc(UserSortField::CreatedAt));

        let query = UserListQuery {
            ordering: Some("username".into()),
            ..Default::default()
        }
        .into_query();
        assert_eq!(query.ordering, SortOrder::asc(UserSortField::Username));
    }

    #[test]
    fn test_user_blogs_filter() {
        let filter = UserBlogsQuery {
            status: Some("Draft".into()),
            is_featured: Some(true),
            ordering: Some("-views_count".into()),
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.status, Some(BlogStatus::Draft));
        assert_eq!(filter.ordering, Some(SortOrder::desc(BlogSortField::ViewsCount)));

        let bad = UserBlogsQuery {
            status: Some("pending".into()),
            ..Default::default()
        }
        .into_filter();
        assert!(bad.is_err());
    }
}
