use derive_more::Display;

use crate::error::Error;
use crate::store::TokenStore;

/// Reason code shown to the user for any bootstrap failure.
pub const CALLBACK_FAILED: &str = "callback_failed";

/// A navigation target produced by the bootstrap flow.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{_0}")]
pub struct Navigation(String);

impl Navigation {
    #[must_use]
    pub fn to(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Terminal behaviour of the login flow.
///
/// Every failure ends the same way: the session is cleared and the user lands
/// on the login page with a generic reason code. Details go to the log only.
#[derive(Debug, Clone)]
pub struct FailureRouter {
    home: String,
    error_redirect: String,
}

impl Default for FailureRouter {
    fn default() -> Self {
        Self {
            home: "/".into(),
            error_redirect: "/login".into(),
        }
    }
}

impl FailureRouter {
    #[must_use]
    pub fn new(home: impl Into<String>, error_redirect: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            error_redirect: error_redirect.into(),
        }
    }

    #[must_use]
    pub fn on_success(&self) -> Navigation {
        Navigation::to(self.home.clone())
    }

    /// Clear any session, log the cause and return the error page target.
    pub fn on_failure<S: TokenStore + ?Sized>(&self, store: &S, reason: &Error) -> Navigation {
        tracing::error!(error = %reason, "Login callback failed");
        if let Err(e) = store.clear() {
            tracing::warn!(error = %e, "Failed to clear session after login failure");
        }
        Navigation::to(format!(
            "{}?error={CALLBACK_FAILED}",
            self.error_redirect
        ))
    }
}
