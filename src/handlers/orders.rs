use super::common::PaginationParams;
use crate::auth::AuthUser;
use crate::entities::order;
use crate::errors::ServiceError;
use crate::services::invoices::Invoice;
use crate::services::orders::{OrderDetail, OrderStatus};
use crate::{ApiResponse, AppState, PaginatedResponse};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Cancellation requires the reason field to be present; an empty string is
/// accepted, a missing field is not.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ReturnRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct VerifyReturnRequest {
    pub approve: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    /// Target status; must be the next forward fulfillment step
    pub status: String,
}

/// List the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders, newest first", body = crate::ApiResponse<crate::PaginatedResponse<order::Model>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<order::Model>>>, ServiceError> {
    let (page, per_page) = pagination.clamped();
    let (orders, total) = state
        .services
        .orders
        .list_orders(user.user_id, page, per_page)
        .await?;
    Ok(Json(ApiResponse::ok(PaginatedResponse {
        items: orders,
        total,
        page,
        per_page,
    })))
}

/// Fetch one order with its items
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order detail", body = crate::ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let detail = state
        .services
        .orders
        .get_order(order_id, Some(user.user_id))
        .await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Fetch an order by its human-readable number
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-number/{order_number}",
    params(("order_number" = String, Path, description = "Order number, e.g. ORD-1A2B3C4D")),
    responses(
        (status = 200, description = "Order detail", body = crate::ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_order_by_number(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let order_id = state
        .services
        .orders
        .find_id_by_order_number(&order_number, user.user_id)
        .await?;
    let detail = state
        .services
        .orders
        .get_order(order_id, Some(user.user_id))
        .await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Cancel a whole order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Order cancelled", body = crate::ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order has items past pending", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let detail = state
        .services
        .orders
        .cancel_order(order_id, user.user_id, request.reason)
        .await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Cancel a single pending item
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/items/{item_id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Order id"),
        ("item_id" = Uuid, Path, description = "Order item id")
    ),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Item cancelled, aggregates recomputed", body = crate::ApiResponse<OrderDetail>),
        (status = 404, description = "Order or item not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Item is past pending", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn cancel_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let detail = state
        .services
        .orders
        .cancel_item(order_id, item_id, user.user_id, request.reason)
        .await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Request a return for a delivered item
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/items/{item_id}/return",
    params(
        ("id" = Uuid, Path, description = "Order id"),
        ("item_id" = Uuid, Path, description = "Order item id")
    ),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Return requested", body = crate::ApiResponse<OrderDetail>),
        (status = 400, description = "Empty return reason", body = crate::errors::ErrorResponse),
        (status = 409, description = "Item is not delivered", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn request_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<ReturnRequest>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let detail = state
        .services
        .orders
        .request_return(order_id, item_id, user.user_id, request.reason)
        .await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Approve or reject a pending return (admin)
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/items/{item_id}/return/verify",
    params(
        ("id" = Uuid, Path, description = "Order id"),
        ("item_id" = Uuid, Path, description = "Order item id")
    ),
    request_body = VerifyReturnRequest,
    responses(
        (status = 200, description = "Return resolved", body = crate::ApiResponse<OrderDetail>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "No pending return on the item", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn verify_return(
    State(state): State<AppState>,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<VerifyReturnRequest>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let detail = state
        .services
        .orders
        .verify_return(order_id, item_id, request.approve)
        .await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Advance fulfillment one step (admin)
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status advanced", body = crate::ApiResponse<OrderDetail>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Not a forward step", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let target = OrderStatus::parse(&request.status).ok_or_else(|| {
        ServiceError::ValidationError(format!("unknown order status {}", request.status))
    })?;
    let detail = state.services.orders.advance_status(order_id, target).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Generate an invoice for a delivered order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/invoice",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Invoice", body = crate::ApiResponse<Invoice>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order not delivered", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Orders"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Invoice>>, ServiceError> {
    let invoice = state
        .services
        .invoices
        .generate(order_id, user.user_id)
        .await?;
    Ok(Json(ApiResponse::ok(invoice)))
}

/// Customer-facing order routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/by-number/:order_number", get(get_order_by_number))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/items/:item_id/cancel", post(cancel_item))
        .route("/orders/:id/items/:item_id/return", post(request_return))
        .route("/orders/:id/invoice", get(get_invoice))
}

/// Admin order routes
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/orders/:id/items/:item_id/return/verify",
            post(verify_return),
        )
        .route("/orders/:id/status", post(update_status))
}
