#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use mycology_store_api::{
    app_router,
    config::AppConfig,
    db,
    entities::product::ProductCategory,
    events,
    notifications::{NotificationError, NotificationKind, Notifier, OrderSnapshot},
    payments::{signature_header, GatewayError, PaymentGateway, PaymentSession, SessionRequest},
    services::catalog::{ProductInput, ProductResponse},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Records every notification instead of sending mail
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(NotificationKind, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(NotificationKind, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, kind: NotificationKind, order_id: &str) -> usize {
        self.sent()
            .iter()
            .filter(|(k, id)| *k == kind && id == order_id)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        kind: NotificationKind,
        order: &OrderSnapshot,
    ) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push((kind, order.id.clone()));
        Ok(())
    }
}

/// Payment gateway double: hands out sequential session ids or fails on demand
#[derive(Default)]
pub struct ScriptedGateway {
    pub requests: Mutex<Vec<SessionRequest>>,
    pub fail: AtomicBool,
    counter: AtomicUsize,
}

impl ScriptedGateway {
    pub fn requests(&self) -> Vec<SessionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_session(&self, request: SessionRequest) -> Result<PaymentSession, GatewayError> {
        self.requests.lock().unwrap().push(request);
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentSession {
            id: format!("cs_test_{}", n),
            url: format!("https://pay.example.com/c/cs_test_{}", n),
        })
    }
}

/// Application over a throwaway SQLite file, with doubles for every outbound collaborator
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    pub gateway: Arc<ScriptedGateway>,
    admin_token: String,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("store.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", path.display()),
            JWT_SECRET.to_string(),
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        cfg.public_base_url = "https://shop.example.com".to_string();
        tweak(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let notifier = Arc::new(RecordingNotifier::default());
        let gateway = Arc::new(ScriptedGateway::default());
        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx, notifier.clone()));

        let state = AppState::new(Arc::new(pool), cfg, gateway.clone(), event_sender);
        let admin_token = state
            .admin_auth
            .issue("admin")
            .expect("issue admin token")
            .token;

        Self {
            router: app_router(state.clone()),
            state,
            notifier,
            gateway,
            admin_token,
            _event_task: event_task,
            _dir: dir,
        }
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("build request")).await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, uri, body, Some(&self.admin_token)).await
    }

    /// Posts `payload` to the webhook endpoint with a valid signature
    pub async fn deliver_webhook(&self, payload: &Value) -> (StatusCode, Value) {
        let raw = serde_json::to_vec(payload).expect("serialize webhook");
        let header = signature_header(WEBHOOK_SECRET, Utc::now().timestamp(), &raw).expect("sign");
        self.deliver_raw_webhook(raw, Some(&header)).await
    }

    pub async fn deliver_raw_webhook(&self, raw: Vec<u8>, signature: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/payment-webhook")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("Stripe-Signature", sig);
        }
        self.send(builder.body(Body::from(raw)).expect("build request")).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> ProductResponse {
        self.seed_product_in(name, price, stock, ProductCategory::Fresh).await
    }

    pub async fn seed_product_in(
        &self,
        name: &str,
        price: Decimal,
        stock: i32,
        category: ProductCategory,
    ) -> ProductResponse {
        self.state
            .catalog
            .create(ProductInput {
                name: name.to_string(),
                description: format!("{} grown on the farm", name),
                price,
                category,
                strain: None,
                stock_quantity: stock,
                image_urls: vec![],
                is_active: true,
            })
            .await
            .expect("seed product")
    }

    pub async fn stock_of(&self, product_id: i32) -> i32 {
        self.state
            .catalog
            .get(product_id)
            .await
            .expect("product exists")
            .stock_quantity
    }

    /// Places an order over HTTP and returns its id
    pub async fn place_order(&self, email: &str, lines: &[(i32, i32)]) -> String {
        let (status, body) = self
            .request(Method::POST, "/api/orders", Some(order_body(email, lines)), None)
            .await;
        assert_eq!(status, StatusCode::CREATED, "order creation failed: {}", body);
        body["data"]["id"].as_str().expect("order id").to_string()
    }

    /// Waits for the event loop to record `expected` notifications
    pub async fn wait_for_notifications(&self, expected: usize) {
        for _ in 0..100 {
            if self.notifier.sent().len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Gives the event loop a moment to drain
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn order_body(email: &str, lines: &[(i32, i32)]) -> Value {
    json!({
        "customerEmail": email,
        "customerName": "Ada Lovelace",
        "shippingAddress": {
            "name": "Ada Lovelace",
            "line1": "1 Spore Way",
            "city": "Eugene",
            "state": "OR",
            "postalCode": "97401",
            "country": "US"
        },
        "items": lines
            .iter()
            .map(|(id, qty)| json!({ "productId": id, "quantity": qty, "price": 0.01 }))
            .collect::<Vec<_>>()
    })
}

pub fn completed_session(session_id: &str, order_id: &str) -> Value {
    json!({
        "id": format!("evt_{}", session_id),
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "customer_email": "ada@example.com",
            "metadata": { "orderId": order_id }
        }}
    })
}

pub fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {}", other),
    }
}
