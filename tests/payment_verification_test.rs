mod common;

use axum::http::StatusCode;
use common::{add_to_cart, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use storefront_api::services::payments::compute_signature;
use uuid::Uuid;

async fn start_online_order(app: &TestApp, token: &str, user: Uuid) -> (Value, Uuid) {
    let address = app.seed_address(user).await;
    let (status, body) = app
        .post(
            "/api/v1/checkout",
            token,
            json!({ "address_id": address.id, "payment_method": "online" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let order_id: Uuid = body["data"]["order_id"].as_str().unwrap().parse().unwrap();
    (body["data"]["intent"].clone(), order_id)
}

fn callback_body(app: &TestApp, intent: &Value, payment_id: &str) -> Value {
    let gateway_order_id = intent["gateway_order_id"].as_str().unwrap();
    let signature = compute_signature(&app.gateway_secret, gateway_order_id, payment_id);
    json!({
        "gateway_order_id": gateway_order_id,
        "gateway_payment_id": payment_id,
        "signature": signature,
    })
}

#[tokio::test]
async fn successful_verification_finalizes_the_order() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let product = app.seed_product("camera", dec!(500), dec!(0), 10).await;
    app.seed_coupon("FLASH", dec!(10), None, dec!(0), 5).await;
    add_to_cart(&app, &token, product.id, 1).await;
    app.post("/api/v1/cart/coupon", &token, json!({ "code": "FLASH" }))
        .await;

    let (intent, order_id) = start_online_order(&app, &token, user).await;

    let (status, body) = app
        .post(
            "/api/v1/payments/verify",
            &token,
            callback_body(&app, &intent, "pay_001"),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["payment_status"], "paid");

    // Finalization side effects land exactly once
    assert_eq!(app.product_quantity(product.id).await, 9);
    assert_eq!(app.coupon_used_count("FLASH").await, 1);
    let (_, cart) = app.get("/api/v1/cart", &token).await;
    assert!(cart["data"]["lines"].as_array().unwrap().is_empty());

    let (status, body) = app
        .get(&format!("/api/v1/orders/{}", order_id), &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["payment_status"], "paid");
    assert_eq!(body["data"]["order"]["confirmed"], true);
}

#[tokio::test]
async fn bad_signature_marks_the_payment_failed() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let product = app.seed_product("tripod", dec!(80), dec!(0), 10).await;
    add_to_cart(&app, &token, product.id, 1).await;
    let (intent, order_id) = start_online_order(&app, &token, user).await;

    let (status, _) = app
        .post(
            "/api/v1/payments/verify",
            &token,
            json!({
                "gateway_order_id": intent["gateway_order_id"],
                "gateway_payment_id": "pay_tampered",
                "signature": "0000deadbeef",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Order is marked failed, nothing was finalized
    let (_, body) = app
        .get(&format!("/api/v1/orders/{}", order_id), &token)
        .await;
    assert_eq!(body["data"]["order"]["payment_status"], "failed");
    assert_eq!(body["data"]["order"]["confirmed"], false);
    assert_eq!(app.product_quantity(product.id).await, 10);
}

#[tokio::test]
async fn bad_signature_after_payment_does_not_demote_the_order() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let product = app.seed_product("lens", dec!(900), dec!(0), 10).await;
    add_to_cart(&app, &token, product.id, 1).await;
    let (intent, order_id) = start_online_order(&app, &token, user).await;

    let (status, _) = app
        .post(
            "/api/v1/payments/verify",
            &token,
            callback_body(&app, &intent, "pay_good"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // A stale invalid callback for the same intent must not undo the
    // finalized payment or reopen the retry path.
    let (status, _) = app
        .post(
            "/api/v1/payments/verify",
            &token,
            json!({
                "gateway_order_id": intent["gateway_order_id"],
                "gateway_payment_id": "pay_forged",
                "signature": "0000deadbeef",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app
        .get(&format!("/api/v1/orders/{}", order_id), &token)
        .await;
    assert_eq!(body["data"]["order"]["payment_status"], "paid");
    assert_eq!(body["data"]["order"]["confirmed"], true);

    let (status, _) = app
        .post(
            &format!("/api/v1/orders/{}/payments/retry", order_id),
            &token,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn replayed_callback_reports_success_without_repeating_side_effects() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let product = app.seed_product("drone", dec!(400), dec!(0), 10).await;
    add_to_cart(&app, &token, product.id, 1).await;
    let (intent, _) = start_online_order(&app, &token, user).await;
    let body = callback_body(&app, &intent, "pay_replay");

    let (status, _) = app
        .post("/api/v1/payments/verify", &token, body.clone())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.product_quantity(product.id).await, 9);

    let (status, response) = app.post("/api/v1/payments/verify", &token, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response["message"],
        "Payment callback already processed"
    );
    // Stock is untouched by the replay
    assert_eq!(app.product_quantity(product.id).await, 9);
}

#[tokio::test]
async fn concurrent_identical_callbacks_finalize_exactly_once() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let product = app.seed_product("speaker", dec!(120), dec!(0), 10).await;
    add_to_cart(&app, &token, product.id, 1).await;
    let (intent, _) = start_online_order(&app, &token, user).await;
    let body = callback_body(&app, &intent, "pay_race");

    let (a, b) = tokio::join!(
        app.post("/api/v1/payments/verify", &token, body.clone()),
        app.post("/api/v1/payments/verify", &token, body),
    );
    assert_eq!(a.0, StatusCode::OK, "{}", a.1);
    assert_eq!(b.0, StatusCode::OK, "{}", b.1);

    assert_eq!(app.product_quantity(product.id).await, 9);
}

#[tokio::test]
async fn retry_creates_a_fresh_intent_until_paid() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let product = app.seed_product("charger", dec!(30), dec!(0), 10).await;
    add_to_cart(&app, &token, product.id, 1).await;
    let (intent, order_id) = start_online_order(&app, &token, user).await;

    let (status, body) = app
        .post(
            &format!("/api/v1/orders/{}/payments/retry", order_id),
            &token,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let retry_intent = body["data"].clone();
    assert_ne!(
        retry_intent["gateway_order_id"],
        intent["gateway_order_id"]
    );

    // Pay against the retried intent, then further retries must conflict
    let (status, _) = app
        .post(
            "/api/v1/payments/verify",
            &token,
            callback_body(&app, &retry_intent, "pay_after_retry"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            &format!("/api/v1/orders/{}/payments/retry", order_id),
            &token,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn callback_for_an_unknown_gateway_order_is_not_found() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let signature = compute_signature(&app.gateway_secret, "gw_missing", "pay_x");
    let (status, _) = app
        .post(
            "/api/v1/payments/verify",
            &token,
            json!({
                "gateway_order_id": "gw_missing",
                "gateway_payment_id": "pay_x",
                "signature": signature,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
