//! Category API endpoints
//!
//! - GET /api/v1/categories/ - Every category, ordered by name
//! - POST /api/v1/categories/ - Create a category (staff only)

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::api::common::{route_slashed, ApiJson};
use crate::api::middleware::{require_staff, ApiError, AppState, AuthenticatedUser};
use crate::models::{Category, CreateCategoryInput};
use crate::services::category::CategoryServiceError;

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::DuplicateName(name) => {
                ApiError::conflict(format!("Category \"{}\" already exists.", name))
            }
            CategoryServiceError::NotFound(what) => {
                ApiError::not_found(format!("Category not found: {}", what))
            }
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

/// Build the category router
pub fn router() -> Router<AppState> {
    route_slashed(
        Router::new(),
        "/categories",
        get(list_categories).post(create_category),
    )
}

/// GET /api/v1/categories/
async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = state.category_service.list().await?;
    Ok(Json(categories))
}

/// POST /api/v1/categories/
async fn create_category(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    require_staff(&user)?;
    let category = state.category_service.create(body).await?;
    tracing::info!(by = %user.username, slug = %category.slug, "Category added");
    Ok((StatusCode::CREATED, Json(category)))
}
