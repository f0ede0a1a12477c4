use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::payments::{
    PaymentIntentResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::{ApiResponse, AppState};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::post,
    Router,
};
use uuid::Uuid;

/// Verify a gateway payment callback
///
/// Replays of an already-processed callback are reported as success without
/// repeating any side effect.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified (or already processed)", body = crate::ApiResponse<VerifyPaymentResponse>),
        (status = 401, description = "Signature mismatch", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown gateway order", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<ApiResponse<VerifyPaymentResponse>>, ServiceError> {
    match state.services.payments.verify_payment(request).await {
        Ok(response) => Ok(Json(ApiResponse::ok_with_message(
            response,
            "Payment verified",
        ))),
        Err(ServiceError::DuplicatePaymentCallback) => Ok(Json(ApiResponse::message(
            "Payment callback already processed",
        ))),
        Err(e) => Err(e),
    }
}

/// Create a fresh payment intent for an unpaid online order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payments/retry",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 201, description = "New intent created", body = crate::ApiResponse<PaymentIntentResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already paid or not online", body = crate::errors::ErrorResponse),
        (status = 504, description = "Payment gateway timed out", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn retry_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentIntentResponse>>), ServiceError> {
    let intent = state
        .services
        .payments
        .retry_payment(order_id, user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(intent))))
}

/// Payment routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/verify", post(verify_payment))
        .route("/orders/:id/payments/retry", post(retry_payment))
}
