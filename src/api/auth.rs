//! Authentication and profile API endpoints
//!
//! - POST /api/v1/auth/register/ - Create an account and issue a token
//! - POST /api/v1/auth/login/ - Exchange credentials for a token
//! - POST /api/v1/auth/logout/ - Revoke the caller's token
//! - POST /api/v1/auth/change-password/ - Change password, rotating the token
//! - GET, PUT, PATCH /api/v1/profile/ - Read or update the caller's profile

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{route_slashed, ApiJson};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{AuthResponse, MessageResponse, TokenResponse};
use crate::models::{UpdateProfileInput, User};
use crate::services::user::{ChangePasswordInput, RegisterInput, UserServiceError};

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound => ApiError::not_found("User not found."),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

/// Build the auth and profile router
pub fn router() -> Router<AppState> {
    let router = Router::new();
    let router = route_slashed(router, "/auth/register", post(register));
    let router = route_slashed(router, "/auth/login", post(login));
    let router = route_slashed(router, "/auth/logout", post(logout));
    let router = route_slashed(router, "/auth/change-password", post(change_password));
    route_slashed(
        router,
        "/profile",
        get(get_profile).put(update_profile).patch(update_profile),
    )
}

/// POST /api/v1/auth/register/
async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, token) = state.user_service.register(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".to_string(),
            user,
            token,
        }),
    ))
}

/// POST /api/v1/auth/login/
///
/// Failed attempts are counted per email. Once the limit is reached the
/// endpoint answers 429 until the window passes, even for the right password.
async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = body.email.trim();

    if let Some(retry_after) = state.rate_limiter.is_limited(email).await {
        tracing::warn!("Login locked out for {}", email);
        return Err(ApiError::rate_limited(
            "Too many failed login attempts. Try again later.",
            retry_after,
        ));
    }

    let (user, token) = match state.user_service.login(email, &body.password).await {
        Ok(result) => result,
        Err(UserServiceError::AuthenticationError(msg)) => {
            state.rate_limiter.record_failure(email).await;
            tracing::info!("Failed login for {}", email);
            return Err(ApiError::unauthorized(msg));
        }
        Err(e) => return Err(e.into()),
    };

    state.rate_limiter.clear(email).await;

    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        user,
        token,
    }))
}

/// POST /api/v1/auth/logout/
async fn logout(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.user_service.logout(user.id).await?;
    Ok(Json(MessageResponse::new("Logout successful")))
}

/// POST /api/v1/auth/change-password/
async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<ChangePasswordInput>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.user_service.change_password(&user, body).await?;
    Ok(Json(TokenResponse {
        message: "Password changed successfully".to_string(),
        token,
    }))
}

/// GET /api/v1/profile/
async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<User>, ApiError> {
    let profile = state.user_service.get_profile(user.id).await?;
    Ok(Json(profile))
}

/// PUT or PATCH /api/v1/profile/
///
/// Both verbs take a partial body; omitted fields are left unchanged.
async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(body): ApiJson<UpdateProfileInput>,
) -> Result<Json<User>, ApiError> {
    let updated = state.user_service.update_profile(&user, body).await?;
    Ok(Json(updated))
}
