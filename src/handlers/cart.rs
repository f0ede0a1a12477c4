use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::checkout::CartView;
use crate::{ApiResponse, AppState};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    /// Units to add; merged into the existing line if one exists
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, message = "coupon code is required"))]
    pub code: String,
}

/// View the current cart
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Current cart", body = crate::ApiResponse<CartView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn view_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state.services.checkout.view_cart(user.user_id).await?;
    Ok(Json(ApiResponse::ok(cart)))
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddItemRequest,
    responses(
        (status = 200, description = "Updated cart", body = crate::ApiResponse<CartView>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    request.validate()?;
    let cart = state
        .services
        .checkout
        .add_item(user.user_id, request.product_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::ok(cart)))
}

/// Increase a cart line's quantity by one
#[utoipa::path(
    post,
    path = "/api/v1/cart/items/{id}/increment",
    params(("id" = Uuid, Path, description = "Cart item id")),
    responses(
        (status = 200, description = "Updated cart", body = crate::ApiResponse<CartView>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn increment_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state
        .services
        .checkout
        .increment_item(user.user_id, item_id)
        .await?;
    Ok(Json(ApiResponse::ok(cart)))
}

/// Decrease a cart line's quantity by one, removing the line at zero
#[utoipa::path(
    post,
    path = "/api/v1/cart/items/{id}/decrement",
    params(("id" = Uuid, Path, description = "Cart item id")),
    responses(
        (status = 200, description = "Updated cart", body = crate::ApiResponse<CartView>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn decrement_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state
        .services
        .checkout
        .decrement_item(user.user_id, item_id)
        .await?;
    Ok(Json(ApiResponse::ok(cart)))
}

/// Remove a cart line
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart item id")),
    responses(
        (status = 200, description = "Updated cart", body = crate::ApiResponse<CartView>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state
        .services
        .checkout
        .remove_item(user.user_id, item_id)
        .await?;
    Ok(Json(ApiResponse::ok(cart)))
}

/// Validate a coupon against the cart and attach it
#[utoipa::path(
    post,
    path = "/api/v1/cart/coupon",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Updated cart", body = crate::ApiResponse<CartView>),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Coupon not applicable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    request.validate()?;
    let cart = state
        .services
        .checkout
        .apply_coupon(user.user_id, &request.code)
        .await?;
    Ok(Json(ApiResponse::ok(cart)))
}

/// Detach the coupon from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/coupon",
    responses(
        (status = 200, description = "Updated cart", body = crate::ApiResponse<CartView>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_coupon(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state.services.checkout.remove_coupon(user.user_id).await?;
    Ok(Json(ApiResponse::ok(cart)))
}

/// Cart routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(view_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/:id/increment", post(increment_item))
        .route("/cart/items/:id/decrement", post(decrement_item))
        .route("/cart/items/:id", delete(remove_item))
        .route("/cart/coupon", post(apply_coupon).delete(remove_coupon))
}
