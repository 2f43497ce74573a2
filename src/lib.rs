// Library exports for the auth/session/anti-abuse backend.
// This file exposes modules and the app-state bootstrap shared by the
// binary entry point and integration tests.

pub mod app;
pub mod app_config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::AppState;
pub use app_config::{AppConfig, CONFIG};
pub use db::{DatabaseConfig, DieselPool, RedisConfig, RedisPool};
pub use error::ApiError;
pub use middleware::{auth_middleware, AuthenticatedUser};
pub use models::auth::{AccessTokenClaims, RefreshTokenClaims};

// Re-export route builders
pub use handlers::{auth_routes, payment_routes};

/// Builds the shared application state: database/Redis pools, the JWT,
/// encryption, audit, and two-factor services, and the HTTP-backed
/// payment/catalog collaborators. Mirrors the load-everything-once-at-startup
/// order the rest of the ambient stack assumes is already live.
pub async fn initialize_app_state() -> Result<AppState, Box<dyn std::error::Error>> {
    use std::sync::Arc;
    use tracing::info;

    dotenv::dotenv().ok();

    let config = app_config::config();

    info!("initializing database pool");
    let db_config = db::DieselDatabaseConfig::default();
    let diesel_pool = db::create_diesel_pool(db_config).await?;

    if migrations::should_run_migrations() {
        info!("running embedded migrations");
        let migration_config = migrations::MigrationConfig::default();
        migrations::run_all_migrations(&diesel_pool, migration_config)
            .await
            .map_err(|e| format!("migration failed: {e}"))?;
    }

    info!("initializing redis pool");
    let redis_config = db::RedisConfig::from_env();
    let redis_pool = db::RedisPool::new(redis_config).await?;

    let jwt_service = Arc::new(services::JwtService::from_env()?);
    let rate_limit_service = Arc::new(services::RateLimitService::new(Some(redis_pool.clone())));
    let failed_login_tracker = Arc::new(services::FailedLoginTracker::new(Some(redis_pool.clone())));
    let audit_writer = Arc::new(services::AuditWriter::from_config());
    let two_factor_service = Arc::new(services::TwoFactorService::from_config()?);
    let field_cipher = Arc::new(services::encryption::FieldCipher::from_config()?);
    let email_service = Arc::new(services::EmailService::new(config.email.clone())?);

    let payment_gateway: Arc<dyn services::payment::PaymentGateway> = Arc::new(
        services::StripePaymentGateway::new(config.payment.api_base_url.clone(), config.payment.secret_key.clone()),
    );
    let product_catalog: Arc<dyn services::payment::ProductCatalog> =
        Arc::new(services::HttpProductCatalog::new(config.payment.catalog_base_url.clone()));

    Ok(AppState {
        config: Arc::new(config.clone()),
        diesel_pool,
        redis_pool,
        jwt_service,
        rate_limit_service,
        failed_login_tracker,
        audit_writer,
        two_factor_service,
        field_cipher,
        email_service,
        payment_gateway,
        product_catalog,
    })
}

/// Reports the health of the backing stores this service depends on.
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    use axum::http::StatusCode;
    use axum::Json;

    let mut overall_healthy = true;
    let timestamp = chrono::Utc::now().to_rfc3339();

    let postgres_health = match db::check_diesel_health(&state.diesel_pool).await {
        Ok(_) => serde_json::json!({"status": "healthy", "error": null}),
        Err(e) => {
            overall_healthy = false;
            serde_json::json!({"status": "unhealthy", "error": format!("database connection failed: {e}")})
        },
    };

    let redis_health = state.redis_pool.health_check().await;
    if !redis_health.is_healthy {
        overall_healthy = false;
    }

    let response = serde_json::json!({
        "status": if overall_healthy { "healthy" } else { "degraded" },
        "service": "auth-core",
        "timestamp": timestamp,
        "components": {
            "postgresql": postgres_health,
            "redis": {
                "status": if redis_health.is_healthy { "healthy" } else { "unhealthy" },
                "latencyMs": redis_health.latency_ms,
                "error": redis_health.error,
            }
        }
    });

    if overall_healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}
