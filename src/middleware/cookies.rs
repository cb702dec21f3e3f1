use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::oidc::PendingLogin;

const PENDING_COOKIE_NAME: &str = "__aq_oidc_pending";

/// Encrypted cookie carrying the pending handshake to the callback path.
pub(super) fn pending_cookie(
    pending: &PendingLogin,
    secure: bool,
    callback_path: &str,
) -> Option<Cookie<'static>> {
    let value = match serde_json::to_string(pending) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode pending login");
            return None;
        }
    };

    Some(
        Cookie::build((PENDING_COOKIE_NAME, value))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .path(callback_path.to_string())
            .max_age(Duration::minutes(5))
            .build(),
    )
}

/// Removal cookie for the pending handshake.
pub(super) fn clear_pending_cookie(callback_path: &str) -> Cookie<'static> {
    Cookie::build((PENDING_COOKIE_NAME, ""))
        .path(callback_path.to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// The pending handshake, if present and decodable.
pub(super) fn get_pending(jar: &PrivateCookieJar) -> Option<PendingLogin> {
    let cookie = jar.get(PENDING_COOKIE_NAME)?;
    serde_json::from_str(cookie.value())
        .inspect_err(|e| tracing::warn!(error = %e, "Undecodable pending login cookie"))
        .ok()
}
