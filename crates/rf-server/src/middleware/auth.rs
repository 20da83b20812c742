//! Identity middleware.
//!
//! Tokens are issued elsewhere; this service only verifies them. A token is
//! `<user_id>.<hex HMAC-SHA256(secret, user_id)>` and arrives either as
//! `Authorization: Bearer <token>` or in the configured cookie. With auth
//! disabled every request runs as [`UserId::ANONYMOUS`].
//!
//! On success the resolved [`UserId`] is inserted into request extensions.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, Request};
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use rf_core::config::AuthConfig;
use rf_core::UserId;

use crate::context::AppContext;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes()).ok()
}

/// Build the token for `user` under `secret`.
pub fn issue_token(secret: &str, user: &UserId) -> rf_core::Result<String> {
    let mut mac = mac_for(secret)
        .ok_or_else(|| rf_core::Error::Internal("invalid HMAC key".into()))?;
    mac.update(user.as_str().as_bytes());
    Ok(format!("{user}.{}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a token's signature and return its user.
pub fn verify_token(secret: &str, token: &str) -> Option<UserId> {
    let (user, signature) = token.rsplit_once('.')?;
    let expected = hex::decode(signature).ok()?;

    let mut mac = mac_for(secret)?;
    mac.update(user.as_bytes());
    mac.verify_slice(&expected).ok()?;

    UserId::parse(user).ok()
}

/// Resolve the caller from raw header values.
///
/// Bearer token first, then the cookie. Returns `None` when auth is enabled
/// and no valid token was presented.
pub fn resolve_user(
    auth: &AuthConfig,
    authorization: Option<&str>,
    cookie: Option<&str>,
) -> Option<UserId> {
    if !auth.enabled {
        return Some(UserId::anonymous());
    }

    let secret = auth.secret.as_deref().filter(|s| !s.is_empty())?;

    if let Some(token) = authorization.and_then(|v| v.strip_prefix("Bearer ")) {
        if let Some(user) = verify_token(secret, token.trim()) {
            return Some(user);
        }
    }

    let prefix = format!("{}=", auth.cookie_name);
    cookie?
        .split(';')
        .filter_map(|part| part.trim().strip_prefix(prefix.as_str()))
        .find_map(|token| verify_token(secret, token))
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Authentication middleware. Applied to every `/api` route.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = header_value(request.headers(), axum::http::header::AUTHORIZATION);
    let cookie = header_value(request.headers(), axum::http::header::COOKIE);

    match resolve_user(&ctx.config.auth, authorization.as_deref(), cookie.as_deref()) {
        Some(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        None => {
            tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated request");
            Err(rf_core::Error::Unauthorized("Authentication required".into()).into())
        }
    }
}
