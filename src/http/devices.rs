/// Device-trust handlers
use axum::{
    extract::{Path, Query, State},
    http::{header::COOKIE, header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::MfaError;
use crate::models::device::{CheckDeviceRequest, RevokeDeviceRequest};
use crate::models::{DeviceContext, DeviceSummary};

use super::AppState;

/// Build the device-trust cookie string.
///
/// HttpOnly + Secure + SameSite=Lax: the token must never be readable
/// from the page's mutable context.
pub(super) fn trust_cookie(name: &str, token: &str, ttl_days: i64) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Lax",
        name,
        token,
        ttl_days * 24 * 60 * 60
    )
}

/// Pull the trust token out of the forwarded Cookie header.
fn cookie_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == cookie_name).then(|| value.to_string())
    })
}

/// POST /api/v1/2fa/devices/check
///
/// Checks the presented trust token (cookie or body). A valid grant past
/// the rotation threshold is rotated transparently: the response carries
/// a Set-Cookie with the replacement token and the old one is revoked in
/// the same transaction.
pub async fn check_device(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CheckDeviceRequest>,
) -> Result<Response, MfaError> {
    let policy = state.device_trust.policy().clone();
    let token = payload
        .token
        .clone()
        .or_else(|| cookie_token(&headers, &policy.cookie_name));

    let Some(token) = token else {
        return Ok(not_valid("device_not_found"));
    };

    let check = match state
        .device_trust
        .check(
            &token,
            payload.ip_address.as_deref(),
            payload.user_agent.as_deref(),
        )
        .await
    {
        Ok(check) => check,
        Err(
            err @ (MfaError::DeviceNotFound | MfaError::DeviceRevoked | MfaError::DeviceExpired),
        ) => {
            return Ok(not_valid(err.kind()));
        }
        Err(err) => return Err(err),
    };

    if !check.needs_rotation {
        return Ok((
            StatusCode::OK,
            Json(json!({
                "valid": true,
                "needs_rotation": false,
                "user_id": check.user_id,
            })),
        )
            .into_response());
    }

    // Transparent rotation: same device metadata, fresh token.
    let context = DeviceContext {
        device_fingerprint: None,
        device_name: None,
        ip_address: payload.ip_address.clone(),
        user_agent: payload.user_agent.clone(),
    };
    let (new_token, _device) = state.device_trust.rotate(&token, &context).await?;
    let cookie = trust_cookie(&policy.cookie_name, &new_token, policy.ttl_days);

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(json!({
            "valid": true,
            "needs_rotation": false,
            "rotated": true,
            "user_id": check.user_id,
        })),
    )
        .into_response())
}

fn not_valid(kind: &str) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "valid": false,
            "needs_rotation": false,
            "kind": kind,
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListDevicesQuery {
    pub user_id: Uuid,
}

/// GET /api/v1/2fa/devices?user_id=...
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListDevicesQuery>,
) -> Result<Response, MfaError> {
    let devices = state.device_trust.list(query.user_id).await?;
    let summaries: Vec<DeviceSummary> = devices.iter().map(DeviceSummary::from).collect();

    Ok((StatusCode::OK, Json(summaries)).into_response())
}

/// POST /api/v1/2fa/devices/:device_id/revoke
pub async fn revoke_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<Uuid>,
    Json(payload): Json<RevokeDeviceRequest>,
) -> Result<Response, MfaError> {
    state
        .device_trust
        .revoke(device_id, payload.user_id, payload.reason.as_deref())
        .await?;

    Ok((StatusCode::OK, Json(json!({ "revoked": true }))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_trust_cookie_attributes() {
        let cookie = trust_cookie("atrium_device_trust", "abc123", 30);
        assert!(cookie.starts_with("atrium_device_trust=abc123;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains(&format!("Max-Age={}", 30 * 24 * 60 * 60)));
    }

    #[test]
    fn test_cookie_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("session=xyz; atrium_device_trust=tok123; theme=dark"),
        );

        assert_eq!(
            cookie_token(&headers, "atrium_device_trust"),
            Some("tok123".to_string())
        );
        assert_eq!(cookie_token(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_token_without_header() {
        let headers = HeaderMap::new();
        assert_eq!(cookie_token(&headers, "atrium_device_trust"), None);
    }
}
