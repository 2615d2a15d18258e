/// MFA Service Main Entry Point
///
/// Starts the HTTP API with:
/// - PostgreSQL connection pool (settings, nonces, claims, devices)
/// - Redis connection manager (recovery-code sets)
use anyhow::{Context, Result};
use mfa_service::{
    config::Settings,
    http::{build_router, AppState},
    services::{DeviceTrustService, EnrollmentService, VerificationService},
};
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mfa_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting MFA Service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let db_pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!(
        "Database pool initialized with {} max connections",
        settings.database.max_connections
    );

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    let redis_client =
        redis::Client::open(settings.redis.url.clone()).context("Invalid Redis URL")?;
    let redis = ConnectionManager::new(redis_client)
        .await
        .context("Failed to connect to Redis")?;
    info!("Redis connection manager initialized");

    let app_state = AppState {
        enrollment: EnrollmentService::new(
            db_pool.clone(),
            redis.clone(),
            settings.totp.clone(),
        ),
        verification: VerificationService::new(
            db_pool.clone(),
            redis.clone(),
            settings.totp.clone(),
            settings.nonce.clone(),
        ),
        device_trust: DeviceTrustService::new(db_pool.clone(), settings.device_trust.clone()),
        internal_api_key: settings.server.internal_api_key.clone(),
    };

    let app = build_router(app_state);
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind server address")?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("MFA service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
