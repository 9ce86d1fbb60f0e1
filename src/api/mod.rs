//! API layer - HTTP handlers and routing
//!
//! Every endpoint lives under `/api/v1` and answers with or without a
//! trailing slash. It includes:
//! - Account and profile endpoints
//! - Public user directory
//! - Category endpoints
//! - Blog, like and comment endpoints
//! - Health check

pub mod auth;
pub mod blogs;
pub mod categories;
pub mod comments;
pub mod common;
pub mod middleware;
pub mod responses;
pub mod users;


use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser, OptionalUser};

/// Build the API router (mounted at `/api/v1`)
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let router = Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(categories::router())
        .merge(blogs::router())
        .merge(comments::router());
    let router = common::route_slashed(router, "/health", get(health));

    // Layers run bottom-up: the token is resolved before throttling so
    // authenticated callers count against their own quota.
    router
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::throttle,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::authenticate,
        ))
}

/// Build the complete router with CORS and request tracing
pub fn build_router(state: AppState, cors_origins: &[String]) -> Result<Router> {
    let origins = cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin: {}", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([
            header::RETRY_AFTER,
            HeaderName::from_static(middleware::X_RATELIMIT_REMAINING),
        ]);

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// GET /api/v1/health/
async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    crate::db::ping(&state.pool).await.map_err(ApiError::internal)?;
    Ok(Json(json!({ "status": "ok" })))
}
