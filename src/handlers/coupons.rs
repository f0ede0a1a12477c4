use crate::auth::AuthUser;
use crate::entities::coupon;
use crate::errors::ServiceError;
use crate::services::coupons::{self as coupon_rules, CreateCouponInput};
use crate::{ApiResponse, AppState};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
#[schema(example = json!({
    "code": "SAVE10",
    "discount_percentage": "10",
    "max_discount_amount": "100",
    "min_order_value": "500",
    "usage_limit": 1000,
    "expiration_date": "2027-01-01T00:00:00Z"
}))]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 64, message = "code must be 1-64 characters"))]
    pub code: String,
    pub discount_percentage: Decimal,
    pub max_discount_amount: Option<Decimal>,
    pub min_order_value: Decimal,
    pub usage_limit: i32,
    pub expiration_date: DateTime<Utc>,
}

/// The best applicable coupon for the current cart, if any.
#[derive(Debug, Serialize, ToSchema)]
pub struct BestCouponResponse {
    pub subtotal: Decimal,
    pub coupon: Option<coupon::Model>,
    pub discount: Decimal,
}

/// Best coupon for the current cart
#[utoipa::path(
    get,
    path = "/api/v1/coupons/best",
    responses(
        (status = 200, description = "Best applicable coupon, null when none applies", body = crate::ApiResponse<BestCouponResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn best_coupon(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<BestCouponResponse>>, ServiceError> {
    let cart = state.services.checkout.view_cart(user.user_id).await?;
    let best = state
        .services
        .coupons
        .best_coupon(cart.subtotal, Utc::now())
        .await?;
    let discount = best
        .as_ref()
        .map(|c| coupon_rules::compute_discount(c, cart.subtotal))
        .unwrap_or_default();
    Ok(Json(ApiResponse::ok(BestCouponResponse {
        subtotal: cart.subtotal,
        coupon: best,
        discount,
    })))
}

/// Create a coupon (admin)
#[utoipa::path(
    post,
    path = "/api/v1/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = crate::ApiResponse<coupon::Model>),
        (status = 400, description = "Invalid coupon definition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    Json(request): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<ApiResponse<coupon::Model>>), ServiceError> {
    request.validate()?;
    let coupon = state
        .services
        .coupons
        .create_coupon(CreateCouponInput {
            code: request.code,
            discount_percentage: request.discount_percentage,
            max_discount_amount: request.max_discount_amount,
            min_order_value: request.min_order_value,
            usage_limit: request.usage_limit,
            expiration_date: request.expiration_date,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(coupon))))
}

/// List all coupons (admin)
#[utoipa::path(
    get,
    path = "/api/v1/coupons",
    responses(
        (status = 200, description = "All coupons", body = crate::ApiResponse<Vec<coupon::Model>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<coupon::Model>>>, ServiceError> {
    let coupons = state.services.coupons.list_coupons().await?;
    Ok(Json(ApiResponse::ok(coupons)))
}

/// Customer-facing coupon routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/coupons/best", get(best_coupon))
}

/// Admin coupon management routes
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/coupons", get(list_coupons).post(create_coupon))
}
