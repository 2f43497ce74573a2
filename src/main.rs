use axum::{middleware as axum_middleware, routing::get, Router};
use shieldgate_core::{
    handlers::{auth_routes, payment_routes},
    health_check, initialize_app_state,
    middleware::{
        automation_guard, body_limit_layer, csrf_guard, dynamic_cors_middleware,
        proto_pollution_guard, security_headers_layer,
    },
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "--version" {
        println!("auth-core v{}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_core=debug,axum=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenv::dotenv().ok();

    let config = shieldgate_core::app_config::config();
    let bind_address = config.bind_address.clone();
    info!("starting auth/session/anti-abuse backend on {}", bind_address);

    let app_state = match initialize_app_state().await {
        Ok(state) => state,
        Err(e) => {
            error!("failed to initialize application state: {}", e);
            return Err(e);
        },
    };

    info!(
        "CORS configured for {} environment with origins: {:?}",
        config.environment, config.security.cors_allowed_origins
    );

    let app = Router::new()
        .route("/v1/health", get(health_check))
        .nest("/api/v1/auth", auth_routes(app_state.clone()))
        .nest("/api/v1/payments", payment_routes(app_state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(security_headers_layer))
                .layer(axum_middleware::from_fn(dynamic_cors_middleware))
                .layer(axum_middleware::from_fn(csrf_guard))
                .layer(axum_middleware::from_fn(proto_pollution_guard))
                .layer(axum_middleware::from_fn(automation_guard))
                .layer(body_limit_layer()),
        )
        .with_state(app_state.clone());

    info!("starting background maintenance tasks");
    shieldgate_core::services::initialize_background_tasks(app_state).await;

    let addr: SocketAddr = bind_address.parse()?;
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;

    Ok(())
}
