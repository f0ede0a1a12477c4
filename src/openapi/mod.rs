//! OpenAPI documentation for the storefront API.
//!
//! The document is generated from the `#[utoipa::path]` annotations on the
//! handlers and served through Swagger UI at `/swagger-ui`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// Registers the bearer token scheme the protected routes reference.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Checkout, order lifecycle, payment verification, coupons, wallet and invoicing for the storefront.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Health", description = "Liveness and status probes"),
        (name = "Cart", description = "Cart lines and the attached coupon"),
        (name = "Coupons", description = "Coupon discovery and administration"),
        (name = "Checkout", description = "Quotes and order placement"),
        (name = "Orders", description = "Order lifecycle, returns and invoices"),
        (name = "Payments", description = "Gateway callbacks and payment retries"),
        (name = "Wallet", description = "Wallet balance and ledger")
    ),
    paths(
        crate::health_check,
        crate::api_status,
        crate::handlers::cart::view_cart,
        crate::handlers::cart::add_item,
        crate::handlers::cart::increment_item,
        crate::handlers::cart::decrement_item,
        crate::handlers::cart::remove_item,
        crate::handlers::cart::apply_coupon,
        crate::handlers::cart::remove_coupon,
        crate::handlers::coupons::best_coupon,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::list_coupons,
        crate::handlers::checkout::quote,
        crate::handlers::checkout::checkout,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_number,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::cancel_item,
        crate::handlers::orders::request_return,
        crate::handlers::orders::verify_return,
        crate::handlers::orders::update_status,
        crate::handlers::orders::get_invoice,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::retry_payment,
        crate::handlers::wallet::get_wallet,
        crate::handlers::wallet::list_transactions,
    ),
    components(schemas(
        crate::ApiResponse<serde_json::Value>,
        crate::PaginatedResponse<serde_json::Value>,
        crate::ResponseMeta,
        crate::StatusResponse,
        crate::errors::ErrorResponse,
        crate::entities::order::Model,
        crate::entities::order_item::Model,
        crate::entities::coupon::Model,
        crate::entities::product::Model,
        crate::entities::address::Model,
        crate::entities::wallet_transaction::Model,
        crate::services::orders::OrderStatus,
        crate::services::orders::ItemStatus,
        crate::services::orders::PaymentStatus,
        crate::services::orders::PaymentMethod,
        crate::services::orders::OrderDetail,
        crate::services::pricing::Totals,
        crate::services::checkout::CartLine,
        crate::services::checkout::CartView,
        crate::services::checkout::Quote,
        crate::services::payments::VerifyPaymentRequest,
        crate::services::payments::VerifyPaymentResponse,
        crate::services::payments::PaymentIntentResponse,
        crate::services::invoices::Invoice,
        crate::services::invoices::InvoiceLine,
        crate::handlers::cart::AddItemRequest,
        crate::handlers::cart::ApplyCouponRequest,
        crate::handlers::coupons::CreateCouponRequest,
        crate::handlers::coupons::BestCouponResponse,
        crate::handlers::checkout::CheckoutRequest,
        crate::handlers::checkout::CheckoutResponse,
        crate::handlers::orders::CancelRequest,
        crate::handlers::orders::ReturnRequest,
        crate::handlers::orders::VerifyReturnRequest,
        crate::handlers::orders::UpdateStatusRequest,
        crate::handlers::wallet::WalletBalanceResponse,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

/// Swagger UI mounted at `/swagger-ui`, backed by `/api-docs/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(
            utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_generates_and_carries_security_scheme() {
        let doc = ApiDocV1::openapi();
        let json = doc.to_json().expect("openapi serializes");
        assert!(json.contains("bearer_auth"));
        assert!(json.contains("/api/v1/checkout"));
        assert!(json.contains("/api/v1/payments/verify"));
    }

    #[test]
    fn every_tag_is_used() {
        let doc = ApiDocV1::openapi();
        let json = doc.to_json().expect("openapi serializes");
        for tag in ["Cart", "Coupons", "Checkout", "Orders", "Payments", "Wallet"] {
            assert!(json.contains(tag), "missing tag {tag}");
        }
    }
}
