//! Authenticated calls against the AQ backend.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, Request, Response, StatusCode};
use tokio::sync::Mutex;

use crate::backend::{BackendClient, read_envelope};
use crate::error::Error;
use crate::retry::RetryPolicy;
use crate::store::TokenStore;
use crate::types::{Session, UserProfile};

/// Attaches the stored access token to requests and recovers from one 401 per
/// call by reissuing the session.
///
/// Concurrent callers that see a 401 for the same access token share a single
/// reissue: the first one rotates the pair, the others pick up the result from
/// the store.
pub struct AuthenticatedClient<S> {
    backend: BackendClient,
    store: Arc<S>,
    retry: RetryPolicy,
    reissue_lock: Mutex<()>,
}

impl<S: TokenStore> AuthenticatedClient<S> {
    #[must_use]
    pub fn new(backend: BackendClient, store: Arc<S>) -> Self {
        Self {
            backend,
            store,
            retry: RetryPolicy::default(),
            reissue_lock: Mutex::new(()),
        }
    }

    /// Backoff for transport failures on idempotent requests.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Start a request against a backend path. Build it and pass it to [`call`](Self::call).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the path does not form a valid URL.
    pub fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, Error> {
        let url = self.backend.config().endpoint(path)?;
        Ok(self.backend.http().request(method, url))
    }

    /// Send `request` with the stored access token.
    ///
    /// A 401 triggers one reissue and one retry. Any response after that,
    /// including a second 401, is returned as-is.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAuthenticated`] if no session is stored (nothing is sent)
    /// - [`Error::SessionExpired`] if the reissue fails; the store is cleared
    /// - [`Error::RequestNotCloneable`] if the body is a stream
    /// - [`Error::Http`] on network failure
    pub async fn call(&self, request: Request) -> Result<Response, Error> {
        let session = self.store.read()?.ok_or(Error::NotAuthenticated)?;
        let retry_request = request.try_clone().ok_or(Error::RequestNotCloneable)?;

        let response = self.send(request, &session).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!(url = %retry_request.url(), "Access token rejected, reissuing");
        let fresh = self.recover(&session).await?;
        self.send(retry_request, &fresh).await
    }

    /// `GET /auth/me`.
    ///
    /// # Errors
    ///
    /// Errors from [`call`](Self::call), plus [`Error::BackendRejected`] /
    /// [`Error::MalformedResponse`] for an unsuccessful envelope.
    pub async fn user_info(&self) -> Result<UserProfile, Error> {
        let request = self
            .request(Method::GET, &self.backend.config().me_path)?
            .build()?;
        let response = self.call(request).await?;
        read_envelope(response, "user info").await
    }

    /// Whether a complete session is stored.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        matches!(self.store.read(), Ok(Some(_)))
    }

    /// Forget the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store cannot be cleared.
    pub fn logout(&self) -> Result<(), Error> {
        tracing::info!("Logging out");
        self.store.clear()
    }

    async fn send(&self, mut request: Request, session: &Session) -> Result<Response, Error> {
        let bearer = HeaderValue::from_str(&format!("Bearer {}", session.access_token()))
            .map_err(|_| Error::InvalidSession("access token"))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        if !is_idempotent(request.method()) {
            return Ok(self.backend.http().execute(request).await?);
        }

        let http = self.backend.http();
        self.retry
            .run("authenticated request", || {
                let attempt = request.try_clone();
                async move {
                    let attempt = attempt.ok_or(Error::RequestNotCloneable)?;
                    http.execute(attempt).await.map_err(Error::from)
                }
            })
            .await
    }

    /// Obtain a session newer than `rejected`, reissuing at most once across
    /// concurrent callers.
    async fn recover(&self, rejected: &Session) -> Result<Session, Error> {
        let _guard = self.reissue_lock.lock().await;

        let current = match self.store.read()? {
            Some(current) => current,
            None => {
                tracing::warn!("Session cleared while waiting for reissue");
                return Err(Error::SessionExpired);
            }
        };
        if current.access_token() != rejected.access_token() {
            tracing::debug!("Session already reissued by a concurrent request");
            return Ok(current);
        }

        match self.backend.reissue(&current).await {
            Ok(fresh) => {
                self.store.save(&fresh)?;
                tracing::info!("Token reissue successful");
                Ok(fresh)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token reissue failed, clearing session");
                self.store.clear()?;
                Err(Error::SessionExpired)
            }
        }
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}
