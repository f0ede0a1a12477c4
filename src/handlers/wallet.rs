use crate::auth::AuthUser;
use crate::entities::wallet_transaction;
use crate::errors::ServiceError;
use crate::{ApiResponse, AppState};
use axum::{
    extract::{Json, State},
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletBalanceResponse {
    pub balance: Decimal,
}

/// Current wallet balance
#[utoipa::path(
    get,
    path = "/api/v1/wallet",
    responses(
        (status = 200, description = "Wallet balance", body = crate::ApiResponse<WalletBalanceResponse>)
    ),
    security(("bearer_auth" = [])),
    tag = "Wallet"
)]
pub async fn get_wallet(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<WalletBalanceResponse>>, ServiceError> {
    let balance = state.services.wallet.get_balance(user.user_id).await?;
    Ok(Json(ApiResponse::ok(WalletBalanceResponse { balance })))
}

/// Wallet ledger, newest first
#[utoipa::path(
    get,
    path = "/api/v1/wallet/transactions",
    responses(
        (status = 200, description = "Ledger entries", body = crate::ApiResponse<Vec<wallet_transaction::Model>>)
    ),
    security(("bearer_auth" = [])),
    tag = "Wallet"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<wallet_transaction::Model>>>, ServiceError> {
    let transactions = state.services.wallet.list_transactions(user.user_id).await?;
    Ok(Json(ApiResponse::ok(transactions)))
}

/// Wallet routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wallet", get(get_wallet))
        .route("/wallet/transactions", get(list_transactions))
}
