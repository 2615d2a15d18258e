// Integration tests for the MFA service protocol
//
// These tests exercise the full verification protocol against real
// stores:
// - Enrollment confirmation and disable
// - Nonce lifecycle and TOTP verification
// - Anti-replay period claims (sequential and concurrent)
// - Single-use recovery codes
// - Device-trust issue / check / rotate / revoke
//
// To run with actual infrastructure:
//   docker-compose up -d postgres redis
//   DATABASE_URL=postgres://... REDIS_URL=redis://... \
//     cargo test --test mfa_flow_test -- --nocapture

use chrono::Utc;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use uuid::Uuid;

use mfa_service::config::{DeviceTrustSettings, NonceSettings, TotpSettings};
use mfa_service::db;
use mfa_service::models::DeviceContext;
use mfa_service::security::{secret, totp};
use mfa_service::services::{DeviceTrustService, EnrollmentService, VerificationService};
use mfa_service::MfaError;

fn totp_settings() -> TotpSettings {
    TotpSettings {
        issuer: "Atrium".to_string(),
        step_secs: 30,
        digits: 6,
        skew_window: 2,
    }
}

fn nonce_settings() -> NonceSettings {
    NonceSettings { ttl_secs: 300 }
}

fn trust_settings(rotation_after_days: i64) -> DeviceTrustSettings {
    DeviceTrustSettings {
        ttl_days: 30,
        rotation_after_days,
        cookie_name: "atrium_device_trust".to_string(),
    }
}

/// Connect to test infrastructure, or skip the test when it is absent.
async fn setup() -> Option<(PgPool, ConnectionManager)> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping infrastructure-backed test");
            return None;
        }
    };
    let redis_url = match std::env::var("REDIS_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("REDIS_URL not set; skipping infrastructure-backed test");
            return None;
        }
    };

    let pool = match PgPool::connect(&database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to connect to PostgreSQL: {e}; skipping");
            return None;
        }
    };

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        eprintln!("Failed to run migrations: {e}; skipping");
        return None;
    }

    let client = match redis::Client::open(redis_url) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Invalid REDIS_URL: {e}; skipping");
            return None;
        }
    };
    let redis = match ConnectionManager::new(client).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Failed to connect to Redis: {e}; skipping");
            return None;
        }
    };

    Some((pool, redis))
}

/// Enroll a fresh user and return (user_id, shared_secret, recovery_codes).
async fn enroll_user(
    pool: &PgPool,
    redis: &ConnectionManager,
) -> (Uuid, String, Vec<String>) {
    let enrollment = EnrollmentService::new(pool.clone(), redis.clone(), totp_settings());
    let user_id = Uuid::new_v4();

    let start = enrollment
        .begin_enrollment(user_id, "user@example.com")
        .await
        .expect("begin_enrollment should succeed");

    let code = current_code(&start.secret);
    enrollment
        .confirm_enrollment(user_id, &start.secret, &start.recovery_codes, &code)
        .await
        .expect("confirm_enrollment should accept a live code");

    (user_id, start.secret, start.recovery_codes)
}

/// Compute the code an authenticator app would show right now.
fn current_code(shared_secret: &str) -> String {
    let bytes = secret::decode_secret(shared_secret).expect("secret decodes");
    let period = totp::derive_period(Utc::now().timestamp() as u64, 30);
    totp::generate(&bytes, period, 6).expect("code generates")
}

#[tokio::test]
async fn test_begin_enrollment_persists_nothing() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let enrollment = EnrollmentService::new(pool.clone(), redis.clone(), totp_settings());
    let user_id = Uuid::new_v4();

    enrollment
        .begin_enrollment(user_id, "user@example.com")
        .await
        .expect("begin_enrollment should succeed");

    // Abandoned enrollment leaves no partial state
    let settings = db::two_factor::get_settings(&pool, user_id)
        .await
        .expect("settings query works");
    assert!(settings.is_none());
    assert_eq!(
        db::recovery_codes::remaining(&redis, user_id).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_confirm_enrollment_rejects_wrong_code() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let enrollment = EnrollmentService::new(pool.clone(), redis.clone(), totp_settings());
    let user_id = Uuid::new_v4();

    let start = enrollment
        .begin_enrollment(user_id, "user@example.com")
        .await
        .unwrap();

    let result = enrollment
        .confirm_enrollment(user_id, &start.secret, &start.recovery_codes, "000000")
        .await;

    assert!(matches!(result, Err(MfaError::InvalidCode)));
    // Nothing persisted on failure
    let settings = db::two_factor::get_settings(&pool, user_id).await.unwrap();
    assert!(settings.is_none());
}

#[tokio::test]
async fn test_verify_accepts_live_code_and_rejects_replay() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let (user_id, shared_secret, _) = enroll_user(&pool, &redis).await;
    let verification = VerificationService::new(
        pool.clone(),
        redis.clone(),
        totp_settings(),
        nonce_settings(),
    );

    let code = current_code(&shared_secret);

    let nonce = verification.issue_nonce(user_id).await.unwrap();
    let verified = verification.verify(&nonce.nonce, &code).await.unwrap();
    assert_eq!(verified, user_id);

    // Same code, fresh nonce: the period is already claimed
    let nonce2 = verification.issue_nonce(user_id).await.unwrap();
    let replay = verification.verify(&nonce2.nonce, &code).await;
    assert!(matches!(replay, Err(MfaError::CodeAlreadyUsed)));

    // The replay consumed its nonce, so a retry on it reports an
    // expired session rather than another code check
    let retry = verification.verify(&nonce2.nonce, &code).await;
    assert!(matches!(retry, Err(MfaError::SessionExpired)));
}

#[tokio::test]
async fn test_concurrent_replay_yields_exactly_one_success() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let (user_id, shared_secret, _) = enroll_user(&pool, &redis).await;
    let verification = VerificationService::new(
        pool.clone(),
        redis.clone(),
        totp_settings(),
        nonce_settings(),
    );

    let code = current_code(&shared_secret);
    let nonce_a = verification.issue_nonce(user_id).await.unwrap();
    let nonce_b = verification.issue_nonce(user_id).await.unwrap();

    let (res_a, res_b) = tokio::join!(
        verification.verify(&nonce_a.nonce, &code),
        verification.verify(&nonce_b.nonce, &code),
    );

    let successes = [&res_a, &res_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent attempt may win");

    let rejected = if res_a.is_ok() { res_b } else { res_a };
    assert!(matches!(rejected, Err(MfaError::CodeAlreadyUsed)));
}

#[tokio::test]
async fn test_verify_rejects_wrong_code_without_consuming_nonce() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let (user_id, shared_secret, _) = enroll_user(&pool, &redis).await;
    let verification = VerificationService::new(
        pool.clone(),
        redis.clone(),
        totp_settings(),
        nonce_settings(),
    );

    let nonce = verification.issue_nonce(user_id).await.unwrap();

    let wrong = verification.verify(&nonce.nonce, "000001").await;
    assert!(matches!(wrong, Err(MfaError::InvalidCode)));

    // The nonce survives a failed attempt and still accepts the real code
    let code = current_code(&shared_secret);
    let verified = verification.verify(&nonce.nonce, &code).await.unwrap();
    assert_eq!(verified, user_id);
}

#[tokio::test]
async fn test_verify_requires_enrollment() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let verification = VerificationService::new(
        pool.clone(),
        redis.clone(),
        totp_settings(),
        nonce_settings(),
    );

    let user_id = Uuid::new_v4();
    let nonce = verification.issue_nonce(user_id).await.unwrap();

    let result = verification.verify(&nonce.nonce, "123456").await;
    assert!(matches!(result, Err(MfaError::NotEnrolled)));
}

#[tokio::test]
async fn test_unknown_nonce_is_session_expired() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let verification = VerificationService::new(
        pool.clone(),
        redis.clone(),
        totp_settings(),
        nonce_settings(),
    );

    let result = verification
        .verify("nonexistentnonce0000000000000000", "123456")
        .await;
    assert!(matches!(result, Err(MfaError::SessionExpired)));
}

#[tokio::test]
async fn test_recovery_codes_are_single_use_and_case_insensitive() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let (user_id, _, recovery_codes) = enroll_user(&pool, &redis).await;
    let verification = VerificationService::new(
        pool.clone(),
        redis.clone(),
        totp_settings(),
        nonce_settings(),
    );

    let before = db::recovery_codes::remaining(&redis, user_id).await.unwrap();
    assert_eq!(before, recovery_codes.len() as i64);

    // Lowercased entry of an uppercase code is accepted
    let submitted = recovery_codes[0].to_ascii_lowercase();
    let nonce = verification.issue_nonce(user_id).await.unwrap();
    let verified = verification
        .verify_recovery(&nonce.nonce, &submitted)
        .await
        .unwrap();
    assert_eq!(verified, user_id);

    // The set shrank by exactly one
    let after = db::recovery_codes::remaining(&redis, user_id).await.unwrap();
    assert_eq!(after, before - 1);

    // Reuse fails and mutates nothing further
    let nonce2 = verification.issue_nonce(user_id).await.unwrap();
    let reuse = verification.verify_recovery(&nonce2.nonce, &submitted).await;
    assert!(matches!(reuse, Err(MfaError::InvalidRecoveryCode)));
    assert_eq!(
        db::recovery_codes::remaining(&redis, user_id).await.unwrap(),
        after
    );
}

#[tokio::test]
async fn test_device_trust_check_and_rotation() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let (user_id, _, _) = enroll_user(&pool, &redis).await;

    // rotation_after_days = 0 so the grant is immediately due
    let device_trust = DeviceTrustService::new(pool.clone(), trust_settings(0));
    let context = DeviceContext {
        device_fingerprint: Some("fp-123".to_string()),
        device_name: Some("Work laptop".to_string()),
        ip_address: Some("203.0.113.9".to_string()),
        user_agent: Some("Mozilla/5.0".to_string()),
    };

    let (old_token, _) = device_trust.trust(user_id, &context).await.unwrap();

    let check = device_trust
        .check(&old_token, Some("203.0.113.10"), None)
        .await
        .unwrap();
    assert!(check.valid);
    assert!(check.needs_rotation);
    assert_eq!(check.user_id, user_id);

    let (new_token, _) = device_trust.rotate(&old_token, &context).await.unwrap();

    // Old token is dead the moment rotation lands; new one is live
    let old_check = device_trust.check(&old_token, None, None).await;
    assert!(matches!(old_check, Err(MfaError::DeviceRevoked)));
    let new_check = device_trust.check(&new_token, None, None).await.unwrap();
    assert!(new_check.valid);

    // Rotating the dead token again fails rather than minting grants
    let again = device_trust.rotate(&old_token, &context).await;
    assert!(matches!(again, Err(MfaError::DeviceRevoked)));
}

#[tokio::test]
async fn test_unknown_device_token_is_not_found() {
    let Some((pool, _redis)) = setup().await else {
        return;
    };
    let device_trust = DeviceTrustService::new(pool.clone(), trust_settings(7));

    let result = device_trust.check("deadbeef", None, None).await;
    assert!(matches!(result, Err(MfaError::DeviceNotFound)));
}

#[tokio::test]
async fn test_revoke_device_is_idempotent() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let (user_id, _, _) = enroll_user(&pool, &redis).await;
    let device_trust = DeviceTrustService::new(pool.clone(), trust_settings(7));

    let (token, device) = device_trust
        .trust(user_id, &DeviceContext::default())
        .await
        .unwrap();

    device_trust
        .revoke(device.id, user_id, Some("lost device"))
        .await
        .unwrap();
    // Second revoke is a no-op, not an error
    device_trust.revoke(device.id, user_id, None).await.unwrap();

    let check = device_trust.check(&token, None, None).await;
    assert!(matches!(check, Err(MfaError::DeviceRevoked)));
}

#[tokio::test]
async fn test_disable_clears_secret_codes_and_devices() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let (user_id, _, _) = enroll_user(&pool, &redis).await;
    let enrollment = EnrollmentService::new(pool.clone(), redis.clone(), totp_settings());
    let device_trust = DeviceTrustService::new(pool.clone(), trust_settings(7));

    let (token_a, _) = device_trust
        .trust(user_id, &DeviceContext::default())
        .await
        .unwrap();
    let (token_b, _) = device_trust
        .trust(user_id, &DeviceContext::default())
        .await
        .unwrap();

    enrollment.disable(user_id).await.unwrap();

    let settings = db::two_factor::get_settings(&pool, user_id)
        .await
        .unwrap()
        .expect("settings row survives disable");
    assert!(!settings.enabled);
    assert!(settings.secret.is_none());

    assert_eq!(
        db::recovery_codes::remaining(&redis, user_id).await.unwrap(),
        0
    );

    // Every trust grant is invalid after disable
    for token in [token_a, token_b] {
        let check = device_trust.check(&token, None, None).await;
        assert!(matches!(check, Err(MfaError::DeviceRevoked)));
    }
}

#[tokio::test]
async fn test_confirm_enrollment_revokes_prior_trust_grants() {
    let Some((pool, redis)) = setup().await else {
        return;
    };
    let (user_id, _, _) = enroll_user(&pool, &redis).await;
    let enrollment = EnrollmentService::new(pool.clone(), redis.clone(), totp_settings());
    let device_trust = DeviceTrustService::new(pool.clone(), trust_settings(7));

    let (token, _) = device_trust
        .trust(user_id, &DeviceContext::default())
        .await
        .unwrap();

    // Disable, then re-enroll: the old grant must not bypass the new factor
    enrollment.disable(user_id).await.unwrap();
    let start = enrollment
        .begin_enrollment(user_id, "user@example.com")
        .await
        .unwrap();
    let code = current_code(&start.secret);
    enrollment
        .confirm_enrollment(user_id, &start.secret, &start.recovery_codes, &code)
        .await
        .unwrap();

    let check = device_trust.check(&token, None, None).await;
    assert!(matches!(check, Err(MfaError::DeviceRevoked)));
}
