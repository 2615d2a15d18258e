/// HTTP API for the surrounding application
///
/// The service is an internal collaborator: the gateway authenticates the
/// end user, performs the primary-credential check, and calls these
/// endpoints with X-Internal-API-Key. The only piece of state that rides
/// the browser is the device-trust cookie.
mod devices;
mod two_factor;

pub use devices::*;
pub use two_factor::*;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::metrics;
use crate::services::{DeviceTrustService, EnrollmentService, VerificationService};

/// Shared HTTP server state
#[derive(Clone)]
pub struct AppState {
    pub enrollment: EnrollmentService,
    pub verification: VerificationService,
    pub device_trust: DeviceTrustService,
    pub internal_api_key: Option<String>,
}

/// Build the HTTP router with all MFA endpoints
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Enrollment
        .route("/api/v1/2fa/enroll", post(two_factor::begin_enrollment))
        .route(
            "/api/v1/2fa/enroll/confirm",
            post(two_factor::confirm_enrollment),
        )
        .route("/api/v1/2fa/disable", post(two_factor::disable))
        // Login-time verification
        .route("/api/v1/2fa/challenge", post(two_factor::issue_nonce))
        .route("/api/v1/2fa/verify", post(two_factor::verify))
        .route(
            "/api/v1/2fa/verify-recovery",
            post(two_factor::verify_recovery),
        )
        // Device trust
        .route("/api/v1/2fa/devices/check", post(devices::check_device))
        .route("/api/v1/2fa/devices", get(devices::list_devices))
        .route(
            "/api/v1/2fa/devices/:device_id/revoke",
            post(devices::revoke_device),
        )
        // Operational
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint (no auth required)
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Authentication middleware - validates X-Internal-API-Key header
async fn auth_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path == "/health" || path == "/metrics" {
        return next.run(request).await;
    }

    let Some(expected_key) = &state.internal_api_key else {
        warn!("Internal API key not configured - blocking all internal requests");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal API key not configured",
        )
            .into_response();
    };

    let provided_key = request
        .headers()
        .get("x-internal-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if provided_key != expected_key {
        warn!(
            path = %request.uri().path(),
            "Unauthorized internal API request - invalid API key"
        );
        return (StatusCode::UNAUTHORIZED, "Invalid API key").into_response();
    }

    next.run(request).await
}
