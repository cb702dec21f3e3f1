use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::backend::{BackendConfig, DEFAULT_BACKEND_URL};
use crate::error::Error;
use crate::oidc::{DEFAULT_AUTHORITY, OidcConfig};
use crate::store::FileTokenStore;

/// Callback path appended to the frontend origin.
pub const CALLBACK_PATH: &str = "/oidc-callback";

/// Client settings assembled from the environment.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientSettings {
    pub oidc: OidcConfig,
    pub backend: BackendConfig,
    /// Issuer for discovery. Endpoints in `oidc` are the Kakao defaults until
    /// [`BootstrapClient::discover`](crate::BootstrapClient::discover) runs.
    pub authority: Url,
    /// Where [`file_store`](Self::file_store) keeps the session, if set.
    pub token_file: Option<PathBuf>,
}

impl ClientSettings {
    /// Read settings from environment variables.
    ///
    /// # Required env vars
    /// - `AQ_OIDC_CLIENT_ID`: provider client (app) key
    /// - `AQ_FRONTEND_URL`: application origin; the redirect URI is `{origin}/oidc-callback`
    ///
    /// # Optional env vars
    /// - `AQ_BACKEND_URL`: backend base URL (default `http://localhost:8080`)
    /// - `AQ_BACKEND_TIMEOUT_SECS`: backend request timeout (default 10)
    /// - `AQ_OIDC_AUTHORITY`: provider issuer (default `https://kauth.kakao.com`)
    /// - `AQ_OIDC_CLIENT_SECRET`: sent with the code exchange when set
    /// - `AQ_OIDC_SCOPES`: comma-separated scopes
    /// - `AQ_TOKEN_FILE`: session file path
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required vars are missing or values are invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let client_id = var("AQ_OIDC_CLIENT_ID")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Config("AQ_OIDC_CLIENT_ID is required".into()))?;
        let frontend: Url = var("AQ_FRONTEND_URL")
            .ok_or_else(|| Error::Config("AQ_FRONTEND_URL is required".into()))?
            .parse()
            .map_err(|e| Error::Config(format!("AQ_FRONTEND_URL: {e}")))?;

        let mut oidc = OidcConfig::new(client_id, redirect_uri(&frontend)?);
        if let Some(secret) = var("AQ_OIDC_CLIENT_SECRET") {
            oidc = oidc.with_client_secret(secret);
        }
        if let Some(scopes) = var("AQ_OIDC_SCOPES") {
            oidc = oidc.with_scopes(
                scopes
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        let authority: Url = var("AQ_OIDC_AUTHORITY")
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORITY)
            .parse()
            .map_err(|e| Error::Config(format!("AQ_OIDC_AUTHORITY: {e}")))?;

        let mut backend =
            BackendConfig::new(resolve_backend_url(var("AQ_BACKEND_URL").as_deref(), &frontend)?);
        if let Some(secs) = var("AQ_BACKEND_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("AQ_BACKEND_TIMEOUT_SECS: {e}")))?;
            backend = backend.with_timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            oidc,
            backend,
            authority,
            token_file: var("AQ_TOKEN_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        })
    }

    /// A [`FileTokenStore`] at `AQ_TOKEN_FILE`, or `None` when it is unset.
    #[must_use]
    pub fn file_store(&self) -> Option<FileTokenStore> {
        self.token_file.as_deref().map(FileTokenStore::new)
    }
}

/// `{origin}/oidc-callback`
///
/// # Errors
///
/// Returns [`Error::Config`] if the origin cannot carry a path.
pub fn redirect_uri(frontend: &Url) -> Result<Url, Error> {
    let base = frontend.as_str().trim_end_matches('/');
    format!("{base}{CALLBACK_PATH}")
        .parse()
        .map_err(|e| Error::Config(format!("redirect URI: {e}")))
}

/// Normalise a configured backend address.
///
/// - unset or empty → `http://localhost:8080`
/// - `//host` → `https://host`
/// - no scheme → `http://` when the frontend runs on localhost, `https://` otherwise
///
/// # Errors
///
/// Returns [`Error::Config`] if the result is not a valid URL.
pub fn resolve_backend_url(raw: Option<&str>, frontend: &Url) -> Result<Url, Error> {
    let raw = raw.map(str::trim).filter(|r| !r.is_empty());
    let normalized = match raw {
        None => DEFAULT_BACKEND_URL.to_string(),
        Some(r) if r.starts_with("//") => format!("https:{r}"),
        Some(r) if r.starts_with("http://") || r.starts_with("https://") => r.to_string(),
        Some(r) => {
            let scheme = if is_local(frontend) { "http" } else { "https" };
            format!("{scheme}://{r}")
        }
    };
    normalized
        .parse()
        .map_err(|e| Error::Config(format!("AQ_BACKEND_URL: {e}")))
}

fn is_local(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost" | "127.0.0.1"))
}
