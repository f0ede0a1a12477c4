//! Storefront API Library
//!
//! Cart, checkout, order lifecycle, payment verification, coupons, wallet
//! and invoicing for the storefront.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::State, middleware::from_fn, response::Json, routing::get, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

pub use config::AppConfig;
pub use db::DbPool;
pub use handlers::AppServices;

/// Shared application state handed to every handler through the router.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

/// Per-response metadata: the request id from the tracing scope plus the
/// time the response was produced.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    pub fn capture() -> Self {
        Self {
            request_id: tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Standard success envelope returned by every endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub meta: ResponseMeta,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: ResponseMeta::capture(),
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            meta: ResponseMeta::capture(),
        }
    }

    /// A success envelope with no payload, only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            meta: ResponseMeta::capture(),
        }
    }
}

/// One page of a listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub service: String,
    pub version: String,
    pub environment: String,
    pub database: String,
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = crate::ApiResponse<String>)),
    tag = "Health"
)]
pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::ok("healthy".to_string()))
}

/// Service status, including database reachability
#[utoipa::path(
    get,
    path = "/status",
    responses((status = 200, description = "Service status", body = crate::ApiResponse<StatusResponse>)),
    tag = "Health"
)]
pub async fn api_status(State(state): State<AppState>) -> Json<ApiResponse<StatusResponse>> {
    let database = match db::check_connection(&state.db).await {
        Ok(()) => "connected".to_string(),
        Err(_) => "unreachable".to_string(),
    };
    Json(ApiResponse::ok(StatusResponse {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
        database,
    }))
}

/// Assembles the versioned API router.
///
/// Everything under `/api/v1` requires a bearer token; the admin surface
/// additionally requires the `admin` role. `/health` and `/status` are open.
pub fn api_v1_routes() -> Router<AppState> {
    let admin = handlers::coupons::admin_routes()
        .merge(handlers::orders::admin_routes())
        .route_layer(from_fn(auth::require_admin));

    let authed = handlers::cart::routes()
        .merge(handlers::coupons::routes())
        .merge(handlers::checkout::routes())
        .merge(handlers::orders::routes())
        .merge(handlers::payments::routes())
        .merge(handlers::wallet::routes())
        .merge(admin)
        .route_layer(from_fn(auth::auth_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(api_status))
        .nest("/api/v1", authed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_carries_data() {
        let response = ApiResponse::ok(42);
        assert!(response.success);
        assert_eq!(response.data, Some(42));
        assert!(response.message.is_none());
    }

    #[test]
    fn message_envelope_has_no_data() {
        let response: ApiResponse<()> = ApiResponse::message("done");
        assert!(response.success);
        assert!(response.data.is_none());
        assert_eq!(response.message.as_deref(), Some("done"));
    }

    #[test]
    fn data_and_message_are_omitted_when_absent() {
        let response: ApiResponse<()> = ApiResponse::message("done");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["message"], "done");
        assert!(json["meta"]["timestamp"].is_string());
    }
}
