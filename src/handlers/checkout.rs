use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::checkout::{CheckoutOutcome, Quote};
use crate::services::orders::{OrderDetail, PaymentMethod};
use crate::services::payments::PaymentIntentResponse;
use crate::{ApiResponse, AppState};
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct QuoteParams {
    /// Shipping address the quote is for
    pub address_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CheckoutRequest {
    pub address_id: Uuid,
    /// One of `cod`, `wallet`, `online`
    pub payment_method: String,
}

/// Checkout result: `finalized` carries the confirmed order, `pending_payment`
/// carries the unconfirmed order plus the gateway intent to pay against.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutResponse {
    Finalized {
        order: OrderDetail,
    },
    PendingPayment {
        order_id: Uuid,
        order_number: String,
        intent: PaymentIntentResponse,
    },
}

/// Price the cart for an address without side effects
#[utoipa::path(
    get,
    path = "/api/v1/checkout/quote",
    params(QuoteParams),
    responses(
        (status = 200, description = "Quoted totals", body = crate::ApiResponse<Quote>),
        (status = 400, description = "Empty cart", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Coupon not applicable", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn quote(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<QuoteParams>,
) -> Result<Json<ApiResponse<Quote>>, ServiceError> {
    let quote = state
        .services
        .checkout
        .quote(user.user_id, params.address_id)
        .await?;
    Ok(Json(ApiResponse::ok(quote)))
}

/// Check out the cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created", body = crate::ApiResponse<CheckoutResponse>),
        (status = 400, description = "Empty cart or invalid payment method", body = crate::errors::ErrorResponse),
        (status = 422, description = "COD cap exceeded, insufficient balance or stock", body = crate::errors::ErrorResponse),
        (status = 504, description = "Payment gateway timed out", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    let method = PaymentMethod::parse(&request.payment_method).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "unknown payment method {}",
            request.payment_method
        ))
    })?;

    let outcome = state
        .services
        .checkout
        .checkout(user.user_id, request.address_id, method)
        .await?;
    let response = match outcome {
        CheckoutOutcome::Finalized(order) => CheckoutResponse::Finalized { order },
        CheckoutOutcome::PendingPayment { order, intent } => CheckoutResponse::PendingPayment {
            order_id: order.id,
            order_number: order.order_number,
            intent,
        },
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(response))))
}

/// Checkout routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/checkout/quote", get(quote))
        .route("/checkout", post(checkout))
}
