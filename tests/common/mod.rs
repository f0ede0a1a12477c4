//! Shared harness for the integration tests: a migrated SQLite database, the
//! full router, and helpers for seeding rows and issuing requests.
#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::{Extension, Router};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use std::sync::Arc;
use storefront_api::auth::{AuthConfig, AuthService};
use storefront_api::config::AppConfig;
use storefront_api::db::{self, DbPool};
use storefront_api::entities::{address, coupon, product, wallet};
use storefront_api::events::EventSender;
use storefront_api::migrator::Migrator;
use storefront_api::services::payments::SandboxGateway;
use storefront_api::{api_v1_routes, AppServices, AppState};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_JWT_SECRET: &str =
    "integration_test_jwt_secret_with_enough_length_and_entropy_0123456789";

pub struct TestApp {
    pub db: Arc<DbPool>,
    pub router: Router,
    pub auth: Arc<AuthService>,
    pub gateway_secret: String,
    db_path: std::path::PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let db_path = std::env::temp_dir().join(format!("storefront-test-{}.db", Uuid::new_v4()));
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let db_pool = Arc::new(
            db::establish_connection(&database_url)
                .await
                .expect("test database connects"),
        );
        Migrator::up(db_pool.as_ref(), None)
            .await
            .expect("migrations apply");

        let mut config = AppConfig::new(
            database_url,
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            0,
            "development".to_string(),
        );
        // Keep gateway calls instant and deterministic in tests
        config.gateway_timeout_secs = 2;

        let auth = Arc::new(AuthService::new(AuthConfig {
            jwt_secret: config.jwt_secret.clone(),
            jwt_issuer: config.auth_issuer.clone(),
            jwt_audience: config.auth_audience.clone(),
            token_expiration_secs: config.jwt_expiration as i64,
        }));

        let (tx, mut rx) = mpsc::channel(64);
        // Drain events so senders never block on a full channel
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let event_sender = EventSender::new(tx);

        let gateway_secret = config.gateway_secret.clone();
        let services = AppServices::new(
            db_pool.clone(),
            &config,
            event_sender.clone(),
            Arc::new(SandboxGateway),
        );
        let state = AppState {
            db: db_pool.clone(),
            config: Arc::new(config),
            event_sender,
            services,
        };

        let router = api_v1_routes()
            .layer(Extension(auth.clone()))
            .with_state(state);

        Self {
            db: db_pool,
            router,
            auth,
            gateway_secret,
            db_path,
        }
    }

    pub fn user_token(&self, user_id: Uuid) -> String {
        self.auth
            .issue_token(user_id, &["customer"])
            .expect("token issuance")
    }

    pub fn admin_token(&self, user_id: Uuid) -> String {
        self.auth
            .issue_token(user_id, &["admin"])
            .expect("token issuance")
    }

    /// Send a request through the router and decode the JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router handles request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body))
            .await
    }

    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        discount_percent: Decimal,
        available_quantity: i32,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            discount_percent: Set(discount_percent),
            available_quantity: Set(available_quantity),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .expect("product inserts")
    }

    pub async fn seed_address(&self, user_id: Uuid) -> address::Model {
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            line1: Set("42 Harbor Lane".to_string()),
            line2: Set(None),
            city: Set("Pune".to_string()),
            state: Set("MH".to_string()),
            postal_code: Set("411001".to_string()),
            country: Set("IN".to_string()),
            phone: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .expect("address inserts")
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_percentage: Decimal,
        max_discount_amount: Option<Decimal>,
        min_order_value: Decimal,
        usage_limit: i32,
    ) -> coupon::Model {
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_percentage: Set(discount_percentage),
            max_discount_amount: Set(max_discount_amount),
            min_order_value: Set(min_order_value),
            usage_limit: Set(usage_limit),
            used_count: Set(0),
            is_active: Set(true),
            expiration_date: Set(Utc::now() + Duration::days(30)),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .expect("coupon inserts")
    }

    pub async fn seed_wallet(&self, user_id: Uuid, balance: Decimal) {
        wallet::ActiveModel {
            user_id: Set(user_id),
            balance: Set(balance),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(self.db.as_ref())
        .await
        .expect("wallet inserts");
    }

    pub async fn set_wallet_balance(&self, user_id: Uuid, balance: Decimal) {
        let existing = wallet::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
            .expect("wallet reads");
        match existing {
            Some(row) => {
                let mut active: wallet::ActiveModel = row.into();
                active.balance = Set(balance);
                active.updated_at = Set(Some(Utc::now()));
                active.update(self.db.as_ref()).await.expect("wallet updates");
            }
            None => self.seed_wallet(user_id, balance).await,
        }
    }

    pub async fn wallet_balance(&self, user_id: Uuid) -> Decimal {
        wallet::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await
            .expect("wallet reads")
            .map(|w| w.balance)
            .unwrap_or_default()
    }

    pub async fn coupon_used_count(&self, code: &str) -> i32 {
        use sea_orm::{ColumnTrait, QueryFilter};
        coupon::Entity::find()
            .filter(coupon::Column::Code.eq(code))
            .one(self.db.as_ref())
            .await
            .expect("coupon reads")
            .map(|c| c.used_count)
            .unwrap_or_default()
    }

    pub async fn product_quantity(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(self.db.as_ref())
            .await
            .expect("product reads")
            .map(|p| p.available_quantity)
            .unwrap_or_default()
    }
}

/// Adds `quantity` of `product_id` to the caller's cart via the API.
pub async fn add_to_cart(app: &TestApp, token: &str, product_id: Uuid, quantity: i32) {
    let (status, body) = app
        .post(
            "/api/v1/cart/items",
            token,
            serde_json::json!({ "product_id": product_id, "quantity": quantity }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "add_to_cart failed: {}", body);
}
