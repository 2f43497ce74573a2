// Common test utilities and helper structs
// Shared across integration tests to avoid duplication

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response, StatusCode},
    Router,
};
use diesel::QueryableByName;
use shieldgate_core::{
    app::AppState,
    db::{create_diesel_pool, DieselDatabaseConfig, DieselPool, RedisConfig, RedisPool},
    services::{AuditWriter, EmailService, FailedLoginTracker, HttpProductCatalog, JwtService, RateLimitService, StripePaymentGateway, TwoFactorService},
    services::encryption::FieldCipher,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

/// Helper struct for count queries against raw SQL in tests
#[derive(QueryableByName)]
pub struct CountRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub count: i64,
}

/// Generates a unique suffix so parallel tests don't collide on unique columns.
pub fn test_suffix() -> String {
    Uuid::new_v4().simple().to_string()
}

pub struct TestApp {
    pub app: Router,
    pub diesel_pool: DieselPool,
    pub redis_pool: RedisPool,
    pub jwt_service: Arc<JwtService>,
}

impl TestApp {
    pub fn post(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "POST", uri)
    }

    pub fn get(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "GET", uri)
    }
}

pub struct TestRequest<'a> {
    app: &'a TestApp,
    request: Request<Body>,
    custom_ip: Option<String>,
    bearer: Option<String>,
    cookie: Option<String>,
}

impl<'a> TestRequest<'a> {
    fn new(app: &'a TestApp, method: &str, uri: &str) -> Self {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        Self { app, request, custom_ip: None, bearer: None, cookie: None }
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        let body_bytes = serde_json::to_vec(body).unwrap();
        self.request = Request::builder()
            .method(self.request.method().clone())
            .uri(self.request.uri().clone())
            .header("content-type", "application/json")
            .body(Body::from(body_bytes))
            .unwrap();
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.custom_ip = Some(ip.to_string());
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    pub fn cookie(mut self, value: &str) -> Self {
        self.cookie = Some(value.to_string());
        self
    }

    pub async fn send(self) -> TestResponse {
        let mut request = self.request;

        let ip_address = self.custom_ip.unwrap_or_else(|| {
            format!("127.0.0.{}:12345", rand::random::<u8>().saturating_add(1))
        });
        request.extensions_mut().insert(ConnectInfo(ip_address.parse::<SocketAddr>().unwrap()));

        if let Some(token) = self.bearer {
            request.headers_mut().insert("authorization", format!("Bearer {token}").parse().unwrap());
        }
        if let Some(cookie) = self.cookie {
            request.headers_mut().insert("cookie", cookie.parse().unwrap());
        }

        let response = self.app.app.clone().oneshot(request).await.unwrap();
        TestResponse { response }
    }
}

pub struct TestResponse {
    response: Response<Body>,
}

impl TestResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.response.headers().get(name).and_then(|v| v.to_str().ok()).map(String::from)
    }

    pub async fn json<T: serde::de::DeserializeOwned>(self) -> T {
        let body = axum::body::to_bytes(self.response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }
}

/// Builds a full `AppState` plus an `auth` + `payments` router, wired against
/// whatever `DATABASE_URL`/`REDIS_URL` the test environment provides (`.env.test`).
pub async fn setup_test_app() -> TestApp {
    dotenv::from_filename(".env.test").ok();

    let db_config = DieselDatabaseConfig::default();
    let diesel_pool = create_diesel_pool(db_config).await.expect("test database pool");

    let redis_config = RedisConfig::from_env();
    let redis_pool = RedisPool::new(redis_config).await.expect("test redis pool");

    let config = shieldgate_core::app_config::config();

    let jwt_service = Arc::new(JwtService::from_env().expect("jwt service"));
    let rate_limit_service = Arc::new(RateLimitService::new(Some(redis_pool.clone())));
    let failed_login_tracker = Arc::new(FailedLoginTracker::new(Some(redis_pool.clone())));
    let audit_writer = Arc::new(AuditWriter::from_config());
    let two_factor_service = Arc::new(TwoFactorService::from_config().expect("two factor service"));
    let field_cipher = Arc::new(FieldCipher::from_config().expect("field cipher"));
    let email_service = Arc::new(EmailService::new(config.email.clone()).expect("email service"));

    let payment_gateway: Arc<dyn shieldgate_core::services::payment::PaymentGateway> =
        Arc::new(StripePaymentGateway::new(config.payment.api_base_url.clone(), config.payment.secret_key.clone()));
    let product_catalog: Arc<dyn shieldgate_core::services::payment::ProductCatalog> =
        Arc::new(HttpProductCatalog::new(config.payment.catalog_base_url.clone()));

    let app_state = AppState {
        config: Arc::new(config.clone()),
        diesel_pool: diesel_pool.clone(),
        redis_pool: redis_pool.clone(),
        jwt_service: jwt_service.clone(),
        rate_limit_service,
        failed_login_tracker,
        audit_writer,
        two_factor_service,
        field_cipher,
        email_service,
        payment_gateway,
        product_catalog,
    };

    let app = Router::new()
        .nest("/api/v1/auth", shieldgate_core::handlers::auth_routes(app_state.clone()))
        .nest("/api/v1/payments", shieldgate_core::handlers::payment_routes(app_state.clone()))
        .with_state(app_state);

    TestApp { app, diesel_pool, redis_pool, jwt_service }
}
