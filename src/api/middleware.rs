//! API middleware
//!
//! Contains:
//! - `AppState`, the services shared by every handler
//! - `ApiError`, the JSON error body and its status mapping
//! - token authentication and the `AuthenticatedUser` / `OptionalUser` extractors
//! - the per-client request throttle

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxBlogRepository, SqlxCategoryRepository, SqlxCommentRepository, SqlxLikeRepository,
    SqlxTokenRepository, SqlxUserRepository,
};
use crate::db::DbPool;
use crate::models::User;
use crate::services::{
    BlogService, CategoryService, CommentService, LikeService, LoginRateLimiter, RateDecision,
    RequestThrottle, UserService,
};

/// Header reporting how many requests are left in the current window
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub user_service: Arc<UserService>,
    pub category_service: Arc<CategoryService>,
    pub blog_service: Arc<BlogService>,
    pub comment_service: Arc<CommentService>,
    pub like_service: Arc<LikeService>,
    pub throttle: Arc<RequestThrottle>,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    /// Wire repositories, cache, services and limiters over one pool
    pub fn new(pool: DbPool, config: &Config) -> Self {
        let cache = create_cache(&config.cache);

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let token_repo = SqlxTokenRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let blog_repo = SqlxBlogRepository::boxed(pool.clone());
        let comment_repo = SqlxCommentRepository::boxed(pool.clone());
        let like_repo = SqlxLikeRepository::boxed(pool.clone());

        let user_service = Arc::new(UserService::new(
            user_repo.clone(),
            token_repo,
            cache.clone(),
            &config.auth,
        ));
        let category_service = Arc::new(CategoryService::new(category_repo.clone(), cache.clone()));
        let blog_service = Arc::new(BlogService::new(
            blog_repo.clone(),
            user_repo,
            category_repo,
            comment_repo.clone(),
            like_repo.clone(),
            cache.clone(),
        ));
        let comment_service = Arc::new(CommentService::new(
            comment_repo,
            blog_repo.clone(),
            cache.clone(),
            config.comments.auto_approve,
        ));
        let like_service = Arc::new(LikeService::new(blog_repo, like_repo, cache));

        Self {
            pool,
            user_service,
            category_service,
            blog_service,
            comment_service,
            like_service,
            throttle: Arc::new(RequestThrottle::from_config(&config.throttle)),
            rate_limiter: Arc::new(LoginRateLimiter::from_config(&config.throttle)),
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The caller, if a valid token was sent
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<User>);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
    #[serde(skip)]
    retry_after: Option<Duration>,
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
            retry_after: None,
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        let mut error = Self::new(code, message);
        error.error.details = Some(details);
        error
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

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    /// 429 carrying a `Retry-After` header, rounded up to whole seconds
    pub fn rate_limited(message: impl Into<String>, retry_after: Duration) -> Self {
        let mut error = Self::new("RATE_LIMITED", message);
        error.retry_after = Some(retry_after);
        error
    }

    /// Log the cause and hide it from the client
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", err);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after;
        let mut response = (status, Json(self)).into_response();
        if let Some(wait) = retry_after {
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Extract the token key from `Authorization: Token <key>` or `Bearer <key>`
fn extract_token(request: &Request) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, key) = value.trim().split_once(' ')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
        Some(key.to_string())
    } else {
        None
    }
}

/// Resolve the token, if any, into an `AuthenticatedUser` extension.
///
/// Requests without credentials pass through anonymously. A token that
/// does not resolve to an active user is rejected with 401.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_token(&request) {
        let user = state
            .user_service
            .authenticate(&token)
            .await
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::unauthorized("Invalid token."))?;
        request.extensions_mut().insert(AuthenticatedUser(user));
    }
    Ok(next.run(request).await)
}

/// Apply the hourly quota: per user when authenticated, per IP otherwise.
///
/// Must run after [`authenticate`].
pub async fn throttle(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let decision = match request.extensions().get::<AuthenticatedUser>() {
        Some(AuthenticatedUser(user)) => state.throttle.check_user(user.id).await,
        None => state.throttle.check_anonymous(client_ip(&request)).await,
    };

    let (mut response, remaining) = match decision {
        RateDecision::Allowed { remaining } => (next.run(request).await, remaining),
        RateDecision::Limited { retry_after } => {
            tracing::warn!(path = %request.uri().path(), "Request throttled");
            let response =
                ApiError::rate_limited("Request was throttled.", retry_after).into_response();
            (response, 0)
        }
    };
    response
        .headers_mut()
        .insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    response
}

/// Peer address from `ConnectInfo`, or the unspecified address when the
/// server was not started with connect info
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))
    }
}

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalUser(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|AuthenticatedUser(user)| user.clone()),
        ))
    }
}

/// Staff-only operations
pub fn require_staff(user: &User) -> Result<(), ApiError> {
    if user.is_staff {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You do not have permission to perform this action.",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_auth(value: &str) -> Request {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_token_schemes() {
        assert_eq!(extract_token(&request_with_auth("Token abc123")), Some("abc123".into()));
        assert_eq!(extract_token(&request_with_auth("Bearer abc123")), Some("abc123".into()));
        assert_eq!(extract_token(&request_with_auth("token  abc123 ")), Some("abc123".into()));
    }

    #[test]
    fn test_extract_token_rejects_other_schemes() {
        assert!(extract_token(&request_with_auth("Basic dXNlcjpwYXNz")).is_none());
        assert!(extract_token(&request_with_auth("Token")).is_none());
        assert!(extract_token(&request_with_auth("Token ")).is_none());

        let bare = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert!(extract_token(&bare).is_none());
    }

    #[test]
    fn test_client_ip_falls_back_to_unspecified() {
        let mut request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert_eq!(client_ip(&request), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let addr: SocketAddr = "203.0.113.7:5000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_ip(&request), addr.ip());
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::new("SOMETHING_ELSE", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response =
            ApiError::rate_limited("slow down", Duration::from_millis(1500)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let error = ApiError::internal("database is on fire");
        assert_eq!(error.error.code, "INTERNAL_ERROR");
        assert!(!error.error.message.contains("fire"));
    }

    #[test]
    fn test_require_staff() {
        let mut user = User::new("s@example.com".into(), "staff".into(), "hash".into());
        assert!(require_staff(&user).is_err());
        user.is_staff = true;
        assert!(require_staff(&user).is_ok());
    }
}
