use axum::http::StatusCode;
use axum::response::IntoResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, TextEncoder};

/// Handler that serialises Prometheus metrics in text format.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

fn register_counter(name: &str, help: &str) -> IntCounter {
    IntCounter::new(name.to_string(), help.to_string())
        .and_then(|c| {
            prometheus::default_registry().register(Box::new(c.clone()))?;
            Ok(c)
        })
        .unwrap_or_else(|e| {
            tracing::error!("failed to create {} counter: {}", name, e);
            IntCounter::new(format!("dummy_{name}"), "dummy").expect("dummy counter")
        })
}

static ENROLLMENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "two_factor_enrollments_total",
        "Total number of confirmed 2FA enrollments",
    )
});

static VERIFY_SUCCESS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "two_factor_verify_success_total",
        "Total number of successful second-factor verifications",
    )
});

static VERIFY_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "two_factor_verify_failures_total",
        "Total number of rejected second-factor attempts (any kind)",
    )
});

static REPLAY_REJECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "two_factor_replay_rejections_total",
        "Total number of attempts rejected because the period was already claimed",
    )
});

static RECOVERY_CONSUMED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "two_factor_recovery_consumed_total",
        "Total number of recovery codes consumed",
    )
});

static DEVICE_CHECKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "device_trust_checks_total",
        "Total number of device-trust token checks",
    )
});

static DEVICE_ROTATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_counter(
        "device_trust_rotations_total",
        "Total number of device-trust token rotations",
    )
});

#[inline]
pub fn inc_enrollments() {
    ENROLLMENTS_TOTAL.inc();
}

#[inline]
pub fn inc_verify_success() {
    VERIFY_SUCCESS_TOTAL.inc();
}

#[inline]
pub fn inc_verify_failures() {
    VERIFY_FAILURES_TOTAL.inc();
}

#[inline]
pub fn inc_replay_rejections() {
    REPLAY_REJECTIONS_TOTAL.inc();
}

#[inline]
pub fn inc_recovery_consumed() {
    RECOVERY_CONSUMED_TOTAL.inc();
}

#[inline]
pub fn inc_device_checks() {
    DEVICE_CHECKS_TOTAL.inc();
}

#[inline]
pub fn inc_device_rotations() {
    DEVICE_ROTATIONS_TOTAL.inc();
}
