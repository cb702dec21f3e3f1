use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::CallbackSettings;
use crate::bootstrap::SessionBootstrap;
use crate::store::TokenStore;

/// Shared state for the callback listener handlers.
pub(super) struct CallbackState<S> {
    pub(super) bootstrap: Arc<SessionBootstrap<S>>,
    pub(super) settings: CallbackSettings,
}

// Manual Clone: avoid derive adding an `S: Clone` bound.
impl<S> Clone for CallbackState<S> {
    fn clone(&self) -> Self {
        Self {
            bootstrap: self.bootstrap.clone(),
            settings: self.settings.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<S: TokenStore> FromRef<CallbackState<S>> for Key {
    fn from_ref(state: &CallbackState<S>) -> Self {
        state.settings.cookie_key.clone()
    }
}
