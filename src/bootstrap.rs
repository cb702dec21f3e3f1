//! End-to-end login: redirect out, callback in, session persisted.
//!
//! The flow spans a full navigation, so it is split in two phases. Phase one
//! ([`SessionBootstrap::begin`]) returns the provider URL together with the
//! [`PendingLogin`] the host must persist. Phase two
//! ([`SessionBootstrap::complete`]) resumes from that persisted state.

use std::sync::Arc;

use derive_more::Display;

use crate::backend::BackendClient;
use crate::error::Error;
use crate::failure::{FailureRouter, Navigation};
use crate::oidc::{BootstrapClient, CallbackParams, LoginRedirect, PendingLogin};
use crate::store::TokenStore;

/// Where a login attempt stands.
///
/// ```text
/// Idle ─► Redirected ─► CallbackReceived ─┬─► ExchangeSucceeded
///   └────────────────────────►┘           └─► ExchangeFailed
/// ```
///
/// `Redirected` is never observed to complete locally: the page unloads and
/// the callback arrives on a fresh `Idle` load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BootstrapPhase {
    Idle,
    Redirected,
    CallbackReceived,
    ExchangeSucceeded,
    ExchangeFailed,
}

impl BootstrapPhase {
    /// Move to `next`, or `None` if the transition is not allowed.
    /// Terminal phases accept no transition.
    #[must_use]
    pub fn advance(self, next: Self) -> Option<Self> {
        use BootstrapPhase::{CallbackReceived, ExchangeFailed, ExchangeSucceeded, Idle, Redirected};
        match (self, next) {
            (Idle, Redirected)
            | (Idle | Redirected, CallbackReceived)
            | (CallbackReceived, ExchangeSucceeded | ExchangeFailed) => Some(next),
            _ => None,
        }
    }
}

/// Result of phase two. Always a navigation, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub phase: BootstrapPhase,
    pub navigation: Navigation,
}

/// Wires the provider handshake, the backend exchange, the token store and
/// the failure router into the login flow.
pub struct SessionBootstrap<S> {
    client: BootstrapClient,
    backend: BackendClient,
    store: Arc<S>,
    router: FailureRouter,
}

impl<S: TokenStore> SessionBootstrap<S> {
    #[must_use]
    pub fn new(client: BootstrapClient, backend: BackendClient, store: Arc<S>) -> Self {
        Self {
            client,
            backend,
            store,
            router: FailureRouter::default(),
        }
    }

    #[must_use]
    pub fn with_router(mut self, router: FailureRouter) -> Self {
        self.router = router;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Phase one. The caller navigates to `url` and persists `pending`.
    #[must_use]
    pub fn begin(&self) -> LoginRedirect {
        let redirect = self.client.begin_login();
        let phase = enter(BootstrapPhase::Idle, BootstrapPhase::Redirected);
        tracing::info!(%phase, "Redirecting to identity provider");
        redirect
    }

    /// Phase two. `pending` is whatever the host persisted in phase one;
    /// `None` (expired or never stored) fails the attempt.
    pub async fn complete(
        &self,
        callback: &CallbackParams,
        pending: Option<&PendingLogin>,
    ) -> BootstrapOutcome {
        let phase = enter(BootstrapPhase::Idle, BootstrapPhase::CallbackReceived);
        tracing::debug!(%phase, "Provider returned control");

        match self.run_exchange(callback, pending).await {
            Ok(()) => {
                let phase = enter(phase, BootstrapPhase::ExchangeSucceeded);
                tracing::info!(%phase, "Login successful");
                BootstrapOutcome {
                    phase,
                    navigation: self.router.on_success(),
                }
            }
            Err(e) => BootstrapOutcome {
                phase: enter(phase, BootstrapPhase::ExchangeFailed),
                navigation: self.router.on_failure(self.store.as_ref(), &e),
            },
        }
    }

    async fn run_exchange(
        &self,
        callback: &CallbackParams,
        pending: Option<&PendingLogin>,
    ) -> Result<(), Error> {
        let pending = pending.ok_or(Error::StateMismatch)?;
        let proof = self.client.complete_login(callback, pending).await?;
        let session = self.backend.exchange(proof).await?;
        self.store.save(&session)
    }
}

/// Advance `current` to `next`, staying put (and logging) on an illegal move.
fn enter(current: BootstrapPhase, next: BootstrapPhase) -> BootstrapPhase {
    current.advance(next).unwrap_or_else(|| {
        tracing::error!(from = %current, to = %next, "Illegal bootstrap transition");
        current
    })
}
