use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{error::AppError, AppState};

type HmacSha256 = Hmac<Sha256>;

/// Authenticated admin, stored in request extensions by [`require_admin`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdminSession {
    pub user: String,
    pub expires_at: i64,
}

fn mac_for(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size")
}

/// Sorted `key=value` lines, excluding `hash`.
fn data_check_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, _)| k.as_str() != "hash")
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Issue a session token: form-encoded `user`, `exp` and an HMAC-SHA256 `hash`.
pub fn issue_token(user: &str, secret: &str, ttl_secs: i64, now: i64) -> (String, i64) {
    let expires_at = now + ttl_secs;
    let mut params = BTreeMap::new();
    params.insert("exp".to_string(), expires_at.to_string());
    params.insert("user".to_string(), user.to_string());

    let mut mac = mac_for(secret);
    mac.update(data_check_string(&params).as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let token = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("user", user)
        .append_pair("exp", &expires_at.to_string())
        .append_pair("hash", &hash)
        .finish();

    (token, expires_at)
}

/// Verify a session token's signature and expiry.
pub fn verify_token(token: &str, secret: &str, now: i64) -> Option<AdminSession> {
    let params: BTreeMap<String, String> = url::form_urlencoded::parse(token.as_bytes())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let hash = hex::decode(params.get("hash")?).ok()?;

    let mut mac = mac_for(secret);
    mac.update(data_check_string(&params).as_bytes());
    if mac.verify_slice(&hash).is_err() {
        tracing::warn!("admin token signature mismatch");
        return None;
    }

    let expires_at: i64 = params.get("exp")?.parse().ok()?;
    if expires_at <= now {
        tracing::debug!(expires_at, "admin token expired");
        return None;
    }

    Some(AdminSession {
        user: params.get("user")?.clone(),
        expires_at,
    })
}

/// Constant-time credential check against the configured admin account.
pub fn check_credentials(state: &AppState, username: &str, password: &str) -> bool {
    let config = &state.config;
    let digest = |value: &str| {
        let mut mac = mac_for(&config.session_secret);
        mac.update(value.as_bytes());
        mac
    };

    let expected = digest(&config.admin_password).finalize().into_bytes();
    let password_ok = digest(password).verify_slice(&expected).is_ok();
    let user_ok = username == config.admin_user;
    user_ok && password_ok
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").map(str::trim)
}

/// Axum middleware guarding admin routes. Stores [`AdminSession`] in request extensions.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AppError::Unauthorized)?;

    let session = verify_token(token, &state.config.session_secret, chrono::Utc::now().timestamp())
        .ok_or(AppError::Unauthorized)?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_issued_token_verifies() {
        let (token, exp) = issue_token("admin", SECRET, 3600, 1_000);
        assert_eq!(exp, 4_600);
        let session = verify_token(&token, SECRET, 2_000).unwrap();
        assert_eq!(session.user, "admin");
        assert_eq!(session.expires_at, 4_600);
    }

    #[test]
    fn test_expired_token_rejected() {
        let (token, _) = issue_token("admin", SECRET, 60, 1_000);
        assert!(verify_token(&token, SECRET, 1_060).is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (token, _) = issue_token("admin", SECRET, 60, 1_000);
        assert!(verify_token(&token, "other-secret", 1_001).is_none());
    }

    #[test]
    fn test_tampered_user_rejected() {
        let (token, _) = issue_token("admin", SECRET, 60, 1_000);
        let forged = token.replace("user=admin", "user=root");
        assert!(verify_token(&forged, SECRET, 1_001).is_none());
    }

    #[test]
    fn test_extended_expiry_rejected() {
        let (token, _) = issue_token("admin", SECRET, 60, 1_000);
        let forged = token.replace("exp=1060", "exp=9999999999");
        assert!(verify_token(&forged, SECRET, 1_001).is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(verify_token("", SECRET, 0).is_none());
        assert!(verify_token("user=admin&exp=10&hash=zz", SECRET, 0).is_none());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
    }
}
