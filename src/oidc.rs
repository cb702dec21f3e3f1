use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::pkce::{self, Pkce};
use crate::retry::RetryPolicy;
use crate::types::IdentityProof;
use crate::well_known::{self, ProviderMetadata};

pub const DEFAULT_AUTHORITY: &str = "https://kauth.kakao.com";

/// Identity, email, display name and avatar.
pub const DEFAULT_SCOPES: [&str; 4] = [
    "openid",
    "account_email",
    "profile_nickname",
    "profile_image",
];

/// Identity provider configuration for the redirect handshake.
///
/// Required fields are constructor parameters; the endpoints default to Kakao.
///
/// ```rust,ignore
/// use aq_session::OidcConfig;
///
/// let config = OidcConfig::new("kakao-app-key", "https://aq.example.com/oidc-callback".parse()?)
///     .with_scopes(vec!["openid".into()]);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OidcConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: Option<String>,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) timeout: Duration,
}

impl OidcConfig {
    #[must_use]
    pub fn new(client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri,
            auth_url: "https://kauth.kakao.com/oauth/authorize"
                .parse()
                .expect("valid default URL"),
            token_url: "https://kauth.kakao.com/oauth/token"
                .parse()
                .expect("valid default URL"),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Confidential clients send this with the code exchange.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Per-request timeout for discovery and the code exchange (default: 10 seconds).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Take the endpoints from a discovery document.
    #[must_use]
    pub fn with_metadata(mut self, metadata: &ProviderMetadata) -> Self {
        self.auth_url = metadata.authorization_endpoint.clone();
        self.token_url = metadata.token_endpoint.clone();
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Handshake state that must survive the navigation to the provider and back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub state: String,
    pub code_verifier: String,
    pub nonce: String,
}

/// Where to send the browser, plus the continuation to persist until the callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LoginRedirect {
    pub url: String,
    pub pending: PendingLogin,
}

/// Query parameters the provider appends to the callback address.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderTokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

/// Client side of the provider redirect handshake.
pub struct BootstrapClient {
    config: OidcConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl BootstrapClient {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: OidcConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            http,
            retry: RetryPolicy::default(),
        })
    }

    /// Use a custom HTTP client. Its timeout settings replace the configured one.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Retry policy for discovery. The code exchange is never retried.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// Point the client at the endpoints published by `authority`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure after retries, or
    /// [`Error::BackendRejected`] / [`Error::MalformedResponse`] for a bad document.
    pub async fn discover(mut self, authority: &Url) -> Result<Self, Error> {
        let url = well_known::discovery_url(authority);
        let http = self.http.clone();
        let response = self
            .retry
            .run("discovery", || {
                let request = http.get(url.clone());
                async move { request.send().await.map_err(Error::from) }
            })
            .await?;
        let response = ensure_success(response, "discovery").await?;
        let metadata: ProviderMetadata =
            response
                .json()
                .await
                .map_err(|e| Error::MalformedResponse {
                    operation: "discovery",
                    detail: e.to_string(),
                })?;

        tracing::debug!(issuer = %metadata.issuer, "Loaded provider metadata");
        self.config = self.config.with_metadata(&metadata);
        Ok(self)
    }

    /// Phase one: build the provider authorization URL.
    ///
    /// The returned [`PendingLogin`] must be stored by the caller and handed
    /// back to [`complete_login`](Self::complete_login) after the redirect.
    #[must_use]
    pub fn begin_login(&self) -> LoginRedirect {
        let pkce = Pkce::generate();
        let state = pkce::generate_state();
        let nonce = pkce::generate_nonce();
        let scope = self.config.scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &scope)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");

        LoginRedirect {
            url: url.into(),
            pending: PendingLogin {
                state,
                code_verifier: pkce.verifier,
                nonce,
            },
        }
    }

    /// Phase two: resolve the provider callback into an identity proof.
    ///
    /// Checks that need no network (provider error, missing code, state) run
    /// before the code exchange.
    ///
    /// # Errors
    ///
    /// - [`Error::Provider`] if the provider reported an error
    /// - [`Error::MissingIdentityProof`] if there is no code, or the token
    ///   response has no `id_token`
    /// - [`Error::StateMismatch`] on a state or nonce mismatch
    /// - [`Error::BackendRejected`] / [`Error::Http`] if the exchange fails
    pub async fn complete_login(
        &self,
        callback: &CallbackParams,
        pending: &PendingLogin,
    ) -> Result<IdentityProof, Error> {
        if let Some(error) = &callback.error {
            return Err(Error::Provider {
                error: error.clone(),
                description: callback
                    .error_description
                    .clone()
                    .unwrap_or_else(|| "Unknown error".into()),
            });
        }

        let code = callback
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(Error::MissingIdentityProof)?;

        if callback.state.as_deref() != Some(pending.state.as_str()) {
            return Err(Error::StateMismatch);
        }

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
            ("code_verifier", pending.code_verifier.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await?;
        let response = ensure_success(response, "provider token exchange").await?;
        let tokens: ProviderTokenResponse =
            response
                .json()
                .await
                .map_err(|e| Error::MalformedResponse {
                    operation: "provider token exchange",
                    detail: e.to_string(),
                })?;

        let id_token = tokens
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingIdentityProof)?;

        if let Some(nonce) = unverified_nonce(&id_token) {
            if nonce != pending.nonce {
                tracing::warn!("id_token nonce does not match pending login");
                return Err(Error::StateMismatch);
            }
        }

        Ok(IdentityProof::from(id_token))
    }
}

/// Read the `nonce` claim without verifying the signature.
///
/// Signature verification belongs to the backend; this only binds the token to
/// the login attempt that requested it.
fn unverified_nonce(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("nonce")?.as_str().map(str::to_owned)
}

/// Return the response on success, or its status and body as an error.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::BackendRejected {
        operation,
        status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config() -> OidcConfig {
        OidcConfig::new(
            "test-client",
            "https://aq.example.com/oidc-callback".parse().unwrap(),
        )
    }

    fn fake_id_token(nonce: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
        let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"1","nonce":"{nonce}"}}"#));
        format!("{header}.{claims}.signature")
    }

    fn callback(code: Option<&str>, state: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(Into::into),
            state: state.map(Into::into),
            ..CallbackParams::default()
        }
    }

    #[test]
    fn authorization_url_carries_handshake_parameters() {
        let client = BootstrapClient::new(test_config()).unwrap();
        let redirect = client.begin_login();
        let url: Url = redirect.url.parse().unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("kauth.kakao.com"));
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "test-client");
        assert_eq!(query["redirect_uri"], "https://aq.example.com/oidc-callback");
        assert_eq!(
            query["scope"],
            "openid account_email profile_nickname profile_image"
        );
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["state"], redirect.pending.state);
        assert_eq!(query["nonce"], redirect.pending.nonce);
        assert_eq!(
            query["code_challenge"],
            pkce::code_challenge(&redirect.pending.code_verifier)
        );
    }

    #[test]
    fn each_login_gets_fresh_handshake_state() {
        let client = BootstrapClient::new(test_config()).unwrap();
        let first = client.begin_login().pending;
        let second = client.begin_login().pending;
        assert_ne!(first.state, second.state);
        assert_ne!(first.code_verifier, second.code_verifier);
    }

    #[test]
    fn config_overrides() {
        let config = test_config()
            .with_auth_url("https://idp.example.com/authorize".parse().unwrap())
            .with_scopes(vec!["openid".into()]);
        assert_eq!(config.auth_url().as_str(), "https://idp.example.com/authorize");
        assert_eq!(config.scopes(), &["openid"]);
        assert_eq!(config.token_url().as_str(), "https://kauth.kakao.com/oauth/token");
    }

    #[tokio::test]
    async fn missing_code_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = test_config()
            .with_token_url(format!("{}/oauth/token", server.uri()).parse().unwrap());
        let client = BootstrapClient::new(config).unwrap();
        let pending = client.begin_login().pending;

        let result = client
            .complete_login(&callback(None, Some(&pending.state)), &pending)
            .await;
        assert!(matches!(result, Err(Error::MissingIdentityProof)));
    }

    #[tokio::test]
    async fn provider_error_is_reported() {
        let client = BootstrapClient::new(test_config()).unwrap();
        let pending = client.begin_login().pending;
        let params = CallbackParams {
            error: Some("access_denied".into()),
            error_description: Some("User denied access".into()),
            ..CallbackParams::default()
        };

        match client.complete_login(&params, &pending).await {
            Err(Error::Provider { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description, "User denied access");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn state_mismatch_is_rejected() {
        let client = BootstrapClient::new(test_config()).unwrap();
        let pending = client.begin_login().pending;
        let result = client
            .complete_login(&callback(Some("code-1"), Some("forged")), &pending)
            .await;
        assert!(matches!(result, Err(Error::StateMismatch)));
    }

    #[tokio::test]
    async fn code_exchange_yields_identity_proof() {
        let server = MockServer::start().await;
        let client = BootstrapClient::new(
            test_config().with_token_url(format!("{}/oauth/token", server.uri()).parse().unwrap()),
        )
        .unwrap();
        let pending = client.begin_login().pending;
        let id_token = fake_id_token(&pending.nonce);

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=code-1"))
            .and(body_string_contains(format!(
                "code_verifier={}",
                pending.code_verifier
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "provider-access",
                "token_type": "bearer",
                "id_token": id_token,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let proof = client
            .complete_login(&callback(Some("code-1"), Some(&pending.state)), &pending)
            .await
            .unwrap();
        assert_eq!(proof.as_str(), id_token);
    }

    #[tokio::test]
    async fn token_response_without_id_token_is_missing_proof() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "provider-access",
                "token_type": "bearer",
            })))
            .mount(&server)
            .await;

        let client = BootstrapClient::new(
            test_config().with_token_url(format!("{}/oauth/token", server.uri()).parse().unwrap()),
        )
        .unwrap();
        let pending = client.begin_login().pending;
        let result = client
            .complete_login(&callback(Some("code-1"), Some(&pending.state)), &pending)
            .await;
        assert!(matches!(result, Err(Error::MissingIdentityProof)));
    }

    #[tokio::test]
    async fn nonce_mismatch_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id_token": fake_id_token("someone-elses-nonce"),
            })))
            .mount(&server)
            .await;

        let client = BootstrapClient::new(
            test_config().with_token_url(format!("{}/oauth/token", server.uri()).parse().unwrap()),
        )
        .unwrap();
        let pending = client.begin_login().pending;
        let result = client
            .complete_login(&callback(Some("code-1"), Some(&pending.state)), &pending)
            .await;
        assert!(matches!(result, Err(Error::StateMismatch)));
    }

    #[tokio::test]
    async fn provider_rejection_keeps_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let client = BootstrapClient::new(
            test_config().with_token_url(format!("{}/oauth/token", server.uri()).parse().unwrap()),
        )
        .unwrap();
        let pending = client.begin_login().pending;
        match client
            .complete_login(&callback(Some("code-1"), Some(&pending.state)), &pending)
            .await
        {
            Err(Error::BackendRejected { status, body, .. }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn discovery_replaces_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": server.uri(),
                "authorization_endpoint": format!("{}/authorize", server.uri()),
                "token_endpoint": format!("{}/token", server.uri()),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BootstrapClient::new(test_config())
            .unwrap()
            .discover(&server.uri().parse().unwrap())
            .await
            .unwrap();
        assert_eq!(client.config().auth_url().path(), "/authorize");
        assert_eq!(client.config().token_url().path(), "/token");
    }

    #[tokio::test]
    async fn code_exchange_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id_token": "idtok123" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config()
            .with_token_url(format!("{}/oauth/token", server.uri()).parse().unwrap())
            .with_timeout(Duration::from_millis(100));
        let client = BootstrapClient::new(config).unwrap();
        let pending = client.begin_login().pending;

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            client.complete_login(&callback(Some("code-1"), Some(&pending.state)), &pending),
        )
        .await
        .expect("client timeout fires first");
        match result {
            Err(Error::Http(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn discovery_retries_after_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .expect(3)
            .mount(&server)
            .await;

        let retry = RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        };
        let result = BootstrapClient::new(test_config().with_timeout(Duration::from_millis(100)))
            .unwrap()
            .with_retry_policy(retry)
            .discover(&server.uri().parse().unwrap())
            .await;

        match result {
            Err(Error::Http(e)) => assert!(e.is_timeout()),
            Err(other) => panic!("expected timeout, got {other:?}"),
            Ok(_) => panic!("expected timeout"),
        }
    }
}
