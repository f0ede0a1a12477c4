mod common;

use axum::http::StatusCode;
use common::{add_to_cart, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

fn money(value: &Value) -> Decimal {
    value
        .as_str()
        .unwrap_or_else(|| panic!("expected decimal string, got {}", value))
        .parse()
        .expect("decimal parses")
}

/// Place a COD order for the given (product, quantity) pairs and return the
/// order detail payload.
async fn place_cod_order(app: &TestApp, token: &str, user: Uuid, items: &[(Uuid, i32)]) -> Value {
    let address = app.seed_address(user).await;
    for (product_id, quantity) in items {
        add_to_cart(app, token, *product_id, *quantity).await;
    }
    let (status, body) = app
        .post(
            "/api/v1/checkout",
            token,
            json!({ "address_id": address.id, "payment_method": "cod" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"]["order"].clone()
}

async fn advance(app: &TestApp, admin: &str, order_id: &str, target: &str) -> (StatusCode, Value) {
    app.post(
        &format!("/api/v1/orders/{}/status", order_id),
        admin,
        json!({ "status": target }),
    )
    .await
}

async fn deliver(app: &TestApp, admin: &str, order_id: &str) {
    for step in ["processing", "shipped", "out_for_delivery", "delivered"] {
        let (status, body) = advance(app, admin, order_id, step).await;
        assert_eq!(status, StatusCode::OK, "step {}: {}", step, body);
    }
}

#[tokio::test]
async fn whole_cancel_refunds_a_wallet_paid_order() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let product = app.seed_product("kettle", dec!(100), dec!(0), 10).await;
    app.seed_wallet(user, dec!(200)).await;
    let address = app.seed_address(user).await;
    add_to_cart(&app, &token, product.id, 1).await;
    let (status, body) = app
        .post(
            "/api/v1/checkout",
            &token,
            json!({ "address_id": address.id, "payment_method": "wallet" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let order_id = body["data"]["order"]["order"]["id"].as_str().unwrap().to_string();
    // net 138 debited from 200
    assert_eq!(app.wallet_balance(user).await, dec!(62));

    let (status, body) = app
        .post(
            &format!("/api/v1/orders/{}/cancel", order_id),
            &token,
            json!({ "reason": "changed my mind" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["order"]["status"], "cancelled");
    assert_eq!(body["data"]["order"]["payment_status"], "refunded");
    assert_eq!(body["data"]["items"][0]["status"], "cancelled");
    assert_eq!(body["data"]["items"][0]["refund_processed"], true);

    // Refund covers the line total only, not taxes or shipping
    assert_eq!(app.wallet_balance(user).await, dec!(162));
    assert_eq!(app.product_quantity(product.id).await, 10);

    // A second cancel conflicts
    let (status, _) = app
        .post(
            &format!("/api/v1/orders/{}/cancel", order_id),
            &token,
            json!({ "reason": "again" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancel_requires_the_reason_field() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);
    let product = app.seed_product("lamp", dec!(40), dec!(0), 10).await;
    let order = place_cod_order(&app, &token, user, &[(product.id, 1)]).await;
    let order_id = order["order"]["id"].as_str().unwrap();

    // Missing field is rejected, empty string is accepted
    let (status, _) = app
        .post(
            &format!("/api/v1/orders/{}/cancel", order_id),
            &token,
            json!({}),
        )
        .await;
    assert_ne!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            &format!("/api/v1/orders/{}/cancel", order_id),
            &token,
            json!({ "reason": "" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn whole_cancel_conflicts_once_items_have_shipped() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);
    let admin = app.admin_token(Uuid::new_v4());

    let product = app.seed_product("desk", dec!(200), dec!(0), 10).await;
    let order = place_cod_order(&app, &token, user, &[(product.id, 1)]).await;
    let order_id = order["order"]["id"].as_str().unwrap();

    advance(&app, &admin, order_id, "processing").await;
    let (status, body) = advance(&app, &admin, order_id, "shipped").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["items"][0]["status"], "shipped");

    let (status, _) = app
        .post(
            &format!("/api/v1/orders/{}/cancel", order_id),
            &token,
            json!({ "reason": "too late" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancelling_one_item_recomputes_the_aggregates() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let keep = app.seed_product("bookshelf", dec!(300), dec!(0), 10).await;
    let drop_it = app.seed_product("stool", dec!(100), dec!(0), 10).await;
    app.seed_coupon("COMBO", dec!(10), None, dec!(0), 5).await;

    let address = app.seed_address(user).await;
    add_to_cart(&app, &token, keep.id, 1).await;
    add_to_cart(&app, &token, drop_it.id, 1).await;
    app.post("/api/v1/cart/coupon", &token, json!({ "code": "COMBO" }))
        .await;
    let (status, body) = app
        .post(
            "/api/v1/checkout",
            &token,
            json!({ "address_id": address.id, "payment_method": "cod" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let order = &body["data"]["order"];
    let order_id = order["order"]["id"].as_str().unwrap().to_string();
    assert_eq!(money(&order["order"]["discount"]), dec!(40));

    let items = order["items"].as_array().unwrap();
    let stool_item = items
        .iter()
        .find(|i| i["product_id"] == drop_it.id.to_string().as_str())
        .unwrap();
    let item_id = stool_item["id"].as_str().unwrap();

    let (status, body) = app
        .post(
            &format!("/api/v1/orders/{}/items/{}/cancel", order_id, item_id),
            &token,
            json!({ "reason": "one was enough" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let updated = &body["data"]["order"];
    // 300 remaining, discount still 40 (below the new subtotal), 18% taxes, 20 shipping
    assert_eq!(money(&updated["subtotal"]), dec!(300));
    assert_eq!(money(&updated["discount"]), dec!(40));
    assert_eq!(money(&updated["taxes"]), dec!(54));
    assert_eq!(money(&updated["net_amount"]), dec!(334));
    assert_eq!(updated["status"], "pending");
    assert_eq!(app.product_quantity(drop_it.id).await, 10);

    // Cancelling the last item cancels the whole order
    let keep_item = body["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["status"] == "pending")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, body) = app
        .post(
            &format!("/api/v1/orders/{}/items/{}/cancel", order_id, keep_item),
            &token,
            json!({ "reason": "cancel the rest" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["order"]["status"], "cancelled");
}

#[tokio::test]
async fn returns_are_only_accepted_after_delivery() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let product = app.seed_product("heater", dec!(150), dec!(0), 10).await;
    let order = place_cod_order(&app, &token, user, &[(product.id, 1)]).await;
    let order_id = order["order"]["id"].as_str().unwrap();
    let item_id = order["items"][0]["id"].as_str().unwrap();

    let (status, _) = app
        .post(
            &format!("/api/v1/orders/{}/items/{}/return", order_id, item_id),
            &token,
            json!({ "reason": "does not heat" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn return_flow_credits_the_wallet_exactly_once() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);
    let admin = app.admin_token(Uuid::new_v4());

    let product = app.seed_product("blender", dec!(90), dec!(0), 10).await;
    let order = place_cod_order(&app, &token, user, &[(product.id, 1)]).await;
    let order_id = order["order"]["id"].as_str().unwrap().to_string();
    let item_id = order["items"][0]["id"].as_str().unwrap().to_string();

    deliver(&app, &admin, &order_id).await;

    // Whitespace-only reason is rejected
    let (status, _) = app
        .post(
            &format!("/api/v1/orders/{}/items/{}/return", order_id, item_id),
            &token,
            json!({ "reason": "   " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            &format!("/api/v1/orders/{}/items/{}/return", order_id, item_id),
            &token,
            json!({ "reason": "cracked jar" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["items"][0]["status"], "returned");
    assert_eq!(body["data"]["items"][0]["return_verified"], false);

    // Customers cannot verify returns
    let verify_uri = format!(
        "/api/v1/orders/{}/items/{}/return/verify",
        order_id, item_id
    );
    let (status, _) = app
        .post(&verify_uri, &token, json!({ "approve": true }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(&verify_uri, &admin, json!({ "approve": true }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["items"][0]["return_decision"], "approved");
    assert_eq!(body["data"]["items"][0]["refund_processed"], true);
    assert_eq!(app.wallet_balance(user).await, dec!(90));
    assert_eq!(app.product_quantity(product.id).await, 10);

    // A second verification conflicts and the balance is unchanged
    let (status, _) = app
        .post(&verify_uri, &admin, json!({ "approve": true }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.wallet_balance(user).await, dec!(90));
}

#[tokio::test]
async fn rejected_return_pays_nothing() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);
    let admin = app.admin_token(Uuid::new_v4());

    let product = app.seed_product("toaster", dec!(60), dec!(0), 10).await;
    let order = place_cod_order(&app, &token, user, &[(product.id, 1)]).await;
    let order_id = order["order"]["id"].as_str().unwrap().to_string();
    let item_id = order["items"][0]["id"].as_str().unwrap().to_string();

    deliver(&app, &admin, &order_id).await;
    app.post(
        &format!("/api/v1/orders/{}/items/{}/return", order_id, item_id),
        &token,
        json!({ "reason": "no longer needed" }),
    )
    .await;

    let (status, body) = app
        .post(
            &format!(
                "/api/v1/orders/{}/items/{}/return/verify",
                order_id, item_id
            ),
            &admin,
            json!({ "approve": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["items"][0]["return_decision"], "rejected");
    assert_eq!(body["data"]["items"][0]["refund_processed"], false);
    assert_eq!(app.wallet_balance(user).await, dec!(0));
    // Rejected returns do not restock
    assert_eq!(app.product_quantity(product.id).await, 9);
}

#[tokio::test]
async fn fulfillment_cascades_and_collects_cod_on_delivery() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);
    let admin = app.admin_token(Uuid::new_v4());

    let product = app.seed_product("fan", dec!(70), dec!(0), 10).await;
    let order = place_cod_order(&app, &token, user, &[(product.id, 2)]).await;
    let order_id = order["order"]["id"].as_str().unwrap().to_string();

    // Skipping a step is rejected
    let (status, _) = advance(&app, &admin, &order_id, "shipped").await;
    assert_eq!(status, StatusCode::CONFLICT);
    // So is moving backwards
    let (status, _) = advance(&app, &admin, &order_id, "pending").await;
    assert_eq!(status, StatusCode::CONFLICT);

    deliver(&app, &admin, &order_id).await;

    let (_, body) = app.get(&format!("/api/v1/orders/{}", order_id), &token).await;
    assert_eq!(body["data"]["order"]["status"], "delivered");
    assert_eq!(body["data"]["order"]["payment_status"], "paid");
    assert_eq!(body["data"]["items"][0]["status"], "delivered");

    // Delivered is terminal
    let (status, _) = advance(&app, &admin, &order_id, "delivered").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unconfirmed_online_orders_do_not_advance() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);
    let admin = app.admin_token(Uuid::new_v4());
    let address = app.seed_address(user).await;

    let product = app.seed_product("mixer", dec!(110), dec!(0), 10).await;
    add_to_cart(&app, &token, product.id, 1).await;
    let (_, body) = app
        .post(
            "/api/v1/checkout",
            &token,
            json!({ "address_id": address.id, "payment_method": "online" }),
        )
        .await;
    let order_id = body["data"]["order_id"].as_str().unwrap().to_string();

    let (status, _) = advance(&app, &admin, &order_id, "processing").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn status_updates_require_the_admin_role() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let product = app.seed_product("rug", dec!(45), dec!(0), 10).await;
    let order = place_cod_order(&app, &token, user, &[(product.id, 1)]).await;
    let order_id = order["order"]["id"].as_str().unwrap();

    let (status, _) = advance(&app, &token, order_id, "processing").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invoices_exist_only_for_delivered_orders() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);
    let admin = app.admin_token(Uuid::new_v4());

    let product = app.seed_product("curtains", dec!(130), dec!(0), 10).await;
    let order = place_cod_order(&app, &token, user, &[(product.id, 1)]).await;
    let order_id = order["order"]["id"].as_str().unwrap().to_string();
    let order_number = order["order"]["order_number"].as_str().unwrap().to_string();

    let (status, _) = app
        .get(&format!("/api/v1/orders/{}/invoice", order_id), &token)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    deliver(&app, &admin, &order_id).await;

    let (status, body) = app
        .get(&format!("/api/v1/orders/{}/invoice", order_id), &token)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let invoice = &body["data"];
    assert!(invoice["invoice_number"].as_str().unwrap().starts_with("INV-"));
    assert_eq!(invoice["order_number"], order_number.as_str());
    assert_eq!(invoice["lines"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn orders_are_listed_and_looked_up_by_number() {
    let app = TestApp::spawn().await;
    let user = Uuid::new_v4();
    let token = app.user_token(user);

    let product = app.seed_product("vase", dec!(25), dec!(0), 50).await;
    let order = place_cod_order(&app, &token, user, &[(product.id, 1)]).await;
    let order_number = order["order"]["order_number"].as_str().unwrap().to_string();

    let (status, body) = app.get("/api/v1/orders?page=1&per_page=10", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .get(&format!("/api/v1/orders/by-number/{}", order_number), &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["order"]["order_number"], order_number.as_str());

    // Another user's token sees nothing
    let stranger = app.user_token(Uuid::new_v4());
    let (status, _) = app
        .get(&format!("/api/v1/orders/by-number/{}", order_number), &stranger)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
