/// Enrollment and login-time verification handlers
use axum::{
    extract::State,
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::error::MfaError;
use crate::models::two_factor::{
    BeginEnrollmentRequest, ChallengeRequest, ConfirmEnrollmentRequest, DisableRequest,
    VerifyRecoveryRequest, VerifyRequest,
};
use crate::models::DeviceContext;

use super::{devices::trust_cookie, AppState};

/// POST /api/v1/2fa/enroll
///
/// Returns enrollment material (secret, provisioning URI, QR, recovery
/// codes). Nothing is persisted until confirmation.
pub async fn begin_enrollment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BeginEnrollmentRequest>,
) -> Result<Response, MfaError> {
    payload.validate()?;

    let start = state
        .enrollment
        .begin_enrollment(payload.user_id, &payload.account_label)
        .await?;

    Ok((StatusCode::OK, Json(start)).into_response())
}

/// POST /api/v1/2fa/enroll/confirm
///
/// Proves device possession with a live code; persists settings and
/// recovery codes on success.
pub async fn confirm_enrollment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ConfirmEnrollmentRequest>,
) -> Result<Response, MfaError> {
    payload.validate()?;

    state
        .enrollment
        .confirm_enrollment(
            payload.user_id,
            &payload.secret,
            &payload.recovery_codes,
            &payload.code,
        )
        .await?;

    Ok((StatusCode::OK, Json(json!({ "enabled": true }))).into_response())
}

/// POST /api/v1/2fa/disable
pub async fn disable(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DisableRequest>,
) -> Result<Response, MfaError> {
    state.enrollment.disable(payload.user_id).await?;

    Ok((StatusCode::OK, Json(json!({ "enabled": false }))).into_response())
}

/// POST /api/v1/2fa/challenge
///
/// Issues the verification nonce after the gateway's primary-credential
/// check succeeds.
pub async fn issue_nonce(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChallengeRequest>,
) -> Result<Response, MfaError> {
    let result = state.verification.issue_nonce(payload.user_id).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "nonce": result.nonce,
            "expires_at": result.expires_at,
        })),
    )
        .into_response())
}

/// POST /api/v1/2fa/verify
///
/// Resolves the login attempt with a TOTP code. With `remember_device`,
/// a successful verification also issues a trust grant and sets the
/// device cookie.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Response, MfaError> {
    payload.validate()?;

    let user_id = state.verification.verify(&payload.nonce, &payload.code).await?;

    let context = DeviceContext {
        device_fingerprint: payload.device_fingerprint,
        device_name: payload.device_name,
        ip_address: payload.ip_address,
        user_agent: payload.user_agent,
    };

    finish_verified_login(&state, user_id, payload.remember_device, context).await
}

/// POST /api/v1/2fa/verify-recovery
///
/// Resolves the login attempt with a single-use recovery code.
pub async fn verify_recovery(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyRecoveryRequest>,
) -> Result<Response, MfaError> {
    payload.validate()?;

    let user_id = state
        .verification
        .verify_recovery(&payload.nonce, &payload.code)
        .await?;

    let context = DeviceContext {
        device_fingerprint: payload.device_fingerprint,
        device_name: payload.device_name,
        ip_address: payload.ip_address,
        user_agent: payload.user_agent,
    };

    finish_verified_login(&state, user_id, payload.remember_device, context).await
}

/// Shared success path: optionally issue the trust grant, which only ever
/// happens right here, immediately after a verification succeeded.
async fn finish_verified_login(
    state: &Arc<AppState>,
    user_id: uuid::Uuid,
    remember_device: bool,
    context: DeviceContext,
) -> Result<Response, MfaError> {
    if !remember_device {
        return Ok((
            StatusCode::OK,
            Json(json!({ "status": "ok", "user_id": user_id })),
        )
            .into_response());
    }

    let (token, _device) = state.device_trust.trust(user_id, &context).await?;
    let policy = state.device_trust.policy();
    let cookie = trust_cookie(&policy.cookie_name, &token, policy.ttl_days);

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(json!({
            "status": "ok",
            "user_id": user_id,
            "device_trusted": true,
        })),
    )
        .into_response())
}
