use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::routing::get;
use axum_extra::extract::PrivateCookieJar;

use super::config::CallbackConfig;
use super::cookies;
use super::state::CallbackState;
use crate::bootstrap::SessionBootstrap;
use crate::oidc::CallbackParams;
use crate::store::TokenStore;

/// Create the login callback router.
///
/// Mounts `{auth_path}/login`, `{auth_path}/logout` and the callback path.
/// Successful logins are written to `store`.
pub fn callback_routes<S: TokenStore>(config: CallbackConfig, store: Arc<S>) -> Router {
    let auth_path = config.settings.auth_path.clone();
    let callback_path = config.settings.callback_path.clone();

    let bootstrap =
        SessionBootstrap::new(config.client, config.backend, store).with_router(config.router);
    let state = CallbackState {
        bootstrap: Arc::new(bootstrap),
        settings: config.settings,
    };

    Router::new()
        .route(&format!("{auth_path}/login"), get(login::<S>))
        .route(&callback_path, get(callback::<S>))
        .route(
            &format!("{auth_path}/logout"),
            get(logout::<S>).post(logout::<S>),
        )
        .with_state(state)
}

// ── Login ──────────────────────────────────────────────────────────

async fn login<S: TokenStore>(
    State(state): State<CallbackState<S>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    let redirect = state.bootstrap.begin();

    let jar = match cookies::pending_cookie(
        &redirect.pending,
        state.settings.secure_cookies,
        &state.settings.callback_path,
    ) {
        Some(cookie) => jar.add(cookie),
        None => jar,
    };

    (jar, Redirect::to(&redirect.url))
}

// ── Callback ───────────────────────────────────────────────────────

async fn callback<S: TokenStore>(
    State(state): State<CallbackState<S>>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> (PrivateCookieJar, Redirect) {
    let pending = cookies::get_pending(&jar);
    if pending.is_none() {
        tracing::warn!("Callback arrived without a pending login");
    }

    let outcome = state.bootstrap.complete(&params, pending.as_ref()).await;

    let jar = jar.remove(cookies::clear_pending_cookie(&state.settings.callback_path));
    (jar, Redirect::to(outcome.navigation.as_str()))
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<S: TokenStore>(
    State(state): State<CallbackState<S>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Redirect) {
    if let Err(e) = state.bootstrap.store().clear() {
        tracing::warn!(error = %e, "Session removal failed during logout");
    }

    let jar = jar.remove(cookies::clear_pending_cookie(&state.settings.callback_path));
    (jar, Redirect::to(&state.settings.logout_redirect))
}
