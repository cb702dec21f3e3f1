use axum_extra::extract::cookie::Key;

use crate::backend::BackendClient;
use crate::config::{CALLBACK_PATH, ClientSettings};
use crate::error::Error;
use crate::failure::FailureRouter;
use crate::oidc::BootstrapClient;

/// Listener settings shared by config and runtime state.
#[derive(Clone)]
pub(crate) struct CallbackSettings {
    pub(crate) cookie_key: Key,
    pub(crate) secure_cookies: bool,
    pub(crate) auth_path: String,
    pub(crate) callback_path: String,
    pub(crate) logout_redirect: String,
}

impl CallbackSettings {
    fn defaults() -> Self {
        Self {
            cookie_key: Key::generate(),
            secure_cookies: true,
            auth_path: "/auth".into(),
            callback_path: CALLBACK_PATH.into(),
            logout_redirect: "/".into(),
        }
    }
}

/// Configuration for the local login callback listener.
///
/// Required collaborators are constructor parameters. Use
/// [`from_env()`](CallbackConfig::from_env) for convention-based setup.
pub struct CallbackConfig {
    pub(super) client: BootstrapClient,
    pub(super) backend: BackendClient,
    pub(super) router: FailureRouter,
    pub(super) settings: CallbackSettings,
}

impl CallbackConfig {
    #[must_use]
    pub fn new(client: BootstrapClient, backend: BackendClient) -> Self {
        Self {
            client,
            backend,
            router: FailureRouter::default(),
            settings: CallbackSettings::defaults(),
        }
    }

    /// Build from [`ClientSettings::from_env`] plus:
    ///
    /// - `COOKIE_KEY`: key bytes for the handshake cookies (at least 64 bytes);
    ///   an ephemeral key is generated when unset
    ///
    /// Cookies are marked `Secure` when the redirect URI is `https`. Provider
    /// endpoints are the Kakao defaults; use
    /// [`from_env_discovered`](Self::from_env_discovered) to load them from
    /// `AQ_OIDC_AUTHORITY`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for missing or invalid settings.
    pub fn from_env() -> Result<Self, Error> {
        let settings = ClientSettings::from_env()?;
        let client = BootstrapClient::new(settings.oidc.clone())?;
        Self::from_settings(settings, client)
    }

    /// Like [`from_env`](Self::from_env), with provider endpoints taken from
    /// the discovery document of `AQ_OIDC_AUTHORITY`.
    ///
    /// # Errors
    ///
    /// Configuration errors as in [`from_env`](Self::from_env), plus discovery
    /// failures from [`BootstrapClient::discover`].
    pub async fn from_env_discovered() -> Result<Self, Error> {
        let settings = ClientSettings::from_env()?;
        let client = BootstrapClient::new(settings.oidc.clone())?
            .discover(&settings.authority)
            .await?;
        Self::from_settings(settings, client)
    }

    fn from_settings(settings: ClientSettings, client: BootstrapClient) -> Result<Self, Error> {
        let secure = settings.oidc.redirect_uri().scheme() == "https";
        let callback_path = settings.oidc.redirect_uri().path().to_string();

        let cookie_key = match std::env::var("COOKIE_KEY") {
            Ok(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                Error::Config(
                    "COOKIE_KEY is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            Err(_) => Key::generate(),
        };

        let backend = BackendClient::new(settings.backend)?;

        Ok(Self::new(client, backend)
            .with_cookie_key(cookie_key)
            .with_secure_cookies(secure)
            .with_callback_path(callback_path))
    }

    #[must_use]
    pub fn with_router(mut self, router: FailureRouter) -> Self {
        self.router = router;
        self
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    /// Prefix for `/login` and `/logout` (default: `/auth`).
    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    /// Must match the path of the provider redirect URI (default: `/oidc-callback`).
    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.settings.callback_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.logout_redirect = path.into();
        self
    }
}
