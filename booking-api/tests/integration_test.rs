use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bigdecimal::BigDecimal;
use booking_api::metrics::{Metrics, MetricsPublisher};
use booking_api::middleware::Claims;
use booking_api::app;
use booking_api::state::{AppState, AuthConfig};
use booking_catalog::{InMemoryInventory, InMemoryUserDirectory};
use booking_core::{
    EventPublisher, LocalSweepLease, LogPublisher, ManualClock, ReservationPolicy, RetryPolicy,
};
use booking_ledger::{ExpiryReaper, InMemoryLedgerStore, InventoryCoordinator, ReservationLedger};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    keeper: Arc<InMemoryInventory>,
    clock: Arc<ManualClock>,
}

fn test_app() -> TestApp {
    let keeper = Arc::new(
        InMemoryInventory::new().with_ticket(5, BigDecimal::from_str("50.00").unwrap(), 100),
    );
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let metrics = Arc::new(Metrics::new().unwrap());
    let publisher: Arc<dyn EventPublisher> =
        Arc::new(MetricsPublisher::new(Arc::new(LogPublisher), metrics.clone()));
    let policy = ReservationPolicy {
        release_retry: RetryPolicy::disabled(),
        remote_timeout: std::time::Duration::from_millis(200),
        ..ReservationPolicy::default()
    };

    let coordinator = Arc::new(InventoryCoordinator::new(
        keeper.clone(),
        publisher.clone(),
        policy.remote_timeout,
        RetryPolicy::disabled(),
    ));
    let ledger = Arc::new(ReservationLedger::new(
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(InMemoryUserDirectory::new([1, 2])),
        coordinator,
        publisher,
        clock.clone(),
        policy,
    ));
    let reaper = Arc::new(ExpiryReaper::new(ledger.clone(), Arc::new(LocalSweepLease::new())));

    let state = AppState {
        ledger,
        reaper,
        metrics,
        auth: AuthConfig { secret: SECRET.to_string() },
    };
    TestApp { router: app(state), keeper, clock }
}

fn token(user_id: i64, role: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

impl TestApp {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = bearer {
            builder = builder.header("Authorization", format!("Bearer {}", t));
        }
        let request = match body {
            Some(b) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(&self, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
        self.call("GET", uri, bearer, None).await
    }

    async fn post(
        &self,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.call("POST", uri, bearer, body).await
    }
}

fn reserve_body(user_id: i64, quantity: i32) -> Value {
    json!({ "userId": user_id, "ticketId": 5, "quantity": quantity })
}

const RESERVE: &str = "/api/bookings/reserve";

#[tokio::test]
async fn test_reserve_confirm_over_http() {
    let app = test_app();
    let customer = token(1, "CUSTOMER");

    let (status, body) = app.post(RESERVE, Some(&customer), Some(reserve_body(1, 2))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "RESERVED");
    assert_eq!(body["totalAmount"], "100.00");
    let id = body["id"].as_str().unwrap().to_string();

    let confirm = format!("/api/bookings/{}/confirm", id);
    let (status, body) = app.post(&confirm, Some(&customer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CONFIRMED");

    let (status, body) = app.post(&confirm, Some(&customer), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("CONFIRMED"));

    let (status, body) = app.get("/api/bookings/user/1", Some(&customer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_error_statuses() {
    let app = test_app();
    let customer = token(1, "CUSTOMER");

    let (status, _) = app.post(RESERVE, None, Some(reserve_body(1, 1))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.post(RESERVE, Some(&customer), Some(reserve_body(1, 0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post(RESERVE, Some(&customer), Some(reserve_body(2, 1))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.post(RESERVE, Some(&customer), Some(reserve_body(1, 1))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.post(RESERVE, Some(&customer), Some(reserve_body(1, 1))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let missing = format!("/api/bookings/{}", uuid::Uuid::new_v4());
    let (status, _) = app.get(&missing, Some(&customer)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.keeper.fail_reserves(Some("ticket service down"));
    let other = token(2, "CUSTOMER");
    let (status, body) = app.post(RESERVE, Some(&other), Some(reserve_body(2, 1))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_admin_routes() {
    let app = test_app();
    let customer = token(1, "CUSTOMER");
    let admin = token(99, "ADMIN");

    app.post(RESERVE, Some(&customer), Some(reserve_body(1, 3))).await;

    let (status, _) = app.get("/api/bookings/status/RESERVED", Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = app.get("/api/bookings/status/reserved", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (status, _) = app.get("/api/bookings/status/PENDING", Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post("/api/bookings/process-expired", Some(&customer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.clock.advance(Duration::minutes(16));
    let (status, body) = app.post("/api/bookings/process-expired", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 1);
    assert_eq!(app.keeper.get(5).unwrap().reserved_quantity, 0);

    let (status, body) = app.get("/api/bookings/ticket/5/availability", Some(&customer)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining"], 1000);
}

#[tokio::test]
async fn test_health_and_metrics_are_public() {
    let app = test_app();
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");

    app.post(RESERVE, Some(&token(1, "CUSTOMER")), Some(reserve_body(1, 1))).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("booking_reservation_events_total{kind=\"reserved\"} 1"));
}
