use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;
use crate::oidc::ensure_success;
use crate::types::{ApiResponse, IdentityProof, Session};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";

/// Header carrying the provider identity token on `POST /auth/login`.
pub const ID_TOKEN_HEADER: &str = "id_token";

/// Header carrying the refresh token on `POST /auth/reissue`.
pub const REFRESH_TOKEN_HEADER: &str = "RefreshToken";

/// AQ backend endpoints.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BackendConfig {
    pub(crate) base_url: Url,
    pub(crate) login_path: String,
    pub(crate) reissue_path: String,
    pub(crate) me_path: String,
    pub(crate) timeout: Duration,
}

impl BackendConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            login_path: "/auth/login".into(),
            reissue_path: "/auth/reissue".into(),
            me_path: "/auth/me".into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Per-request timeout (default: 10 seconds).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_reissue_path(mut self, path: impl Into<String>) -> Self {
        self.reissue_path = path.into();
        self
    }

    #[must_use]
    pub fn with_me_path(mut self, path: impl Into<String>) -> Self {
        self.me_path = path.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve a path against the base URL, keeping any base path prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the result is not a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
            .parse()
            .map_err(|e| Error::Config(format!("endpoint {path}: {e}")))
    }
}

/// Token pair inside a successful envelope; fields are checked, not trusted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Client for the AQ backend session endpoints.
///
/// Exchange and reissue are single attempts: the identity proof is single-use
/// and a replayed reissue would present an already-rotated refresh token.
#[derive(Clone)]
pub struct BackendClient {
    config: BackendConfig,
    http: reqwest::Client,
}

impl BackendClient {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: BackendConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client. Its timeout settings replace the configured one.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Trade a provider identity token for an application session.
    ///
    /// # Errors
    ///
    /// - [`Error::BackendRejected`] on a non-2xx status or `success: false`
    /// - [`Error::MalformedResponse`] if the envelope lacks the token pair
    /// - [`Error::Http`] on network failure or timeout
    pub async fn exchange(&self, proof: IdentityProof) -> Result<Session, Error> {
        let url = self.config.endpoint(&self.config.login_path)?;
        tracing::debug!(url = %url, proof_len = proof.as_str().len(), "Requesting backend login");

        let response = self
            .http
            .post(url)
            .header(ID_TOKEN_HEADER, String::from(proof))
            .send()
            .await?;

        let payload: TokenPayload = read_envelope(response, "backend login").await?;
        session_from(payload, "backend login")
    }

    /// Exchange the current pair for a fresh one.
    ///
    /// # Errors
    ///
    /// Same as [`exchange`](Self::exchange).
    pub async fn reissue(&self, session: &Session) -> Result<Session, Error> {
        let url = self.config.endpoint(&self.config.reissue_path)?;

        let response = self
            .http
            .post(url)
            .bearer_auth(session.access_token())
            .header(REFRESH_TOKEN_HEADER, session.refresh_token())
            .send()
            .await?;

        let payload: TokenPayload = read_envelope(response, "token reissue").await?;
        session_from(payload, "token reissue")
    }
}

/// Check the status, parse the envelope and unwrap `data`.
pub(crate) async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<T, Error> {
    let response = ensure_success(response, operation).await?;
    let status = response.status().as_u16();
    let text = response.text().await?;

    let envelope: ApiResponse<T> =
        serde_json::from_str(&text).map_err(|e| Error::MalformedResponse {
            operation,
            detail: e.to_string(),
        })?;

    if !envelope.success {
        return Err(Error::BackendRejected {
            operation,
            status,
            body: envelope.message.unwrap_or_default(),
        });
    }

    envelope.data.ok_or_else(|| Error::MalformedResponse {
        operation,
        detail: "missing data".into(),
    })
}

fn session_from(payload: TokenPayload, operation: &'static str) -> Result<Session, Error> {
    let access_token = payload
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::MalformedResponse {
            operation,
            detail: "missing accessToken".into(),
        })?;
    let refresh_token = payload
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::MalformedResponse {
            operation,
            detail: "missing refreshToken".into(),
        })?;

    Ok(Session::new(access_token, refresh_token)?
        .with_token_type(payload.token_type.unwrap_or_default())
        .with_expires_in(payload.expires_in))
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn client_for(server: &MockServer) -> BackendClient {
        BackendClient::new(BackendConfig::new(server.uri().parse().unwrap())).unwrap()
    }

    fn proof(value: &str) -> IdentityProof {
        IdentityProof::from(value.to_string())
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let config = BackendConfig::new("https://api.example.com/v1/".parse().unwrap());
        assert_eq!(
            config.endpoint("/auth/login").unwrap().as_str(),
            "https://api.example.com/v1/auth/login"
        );
    }

    #[tokio::test]
    async fn exchange_sends_id_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(header(ID_TOKEN_HEADER, "idtok123"))
            .and(body_string(""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": {
                    "accessToken": "A1",
                    "refreshToken": "R1",
                    "tokenType": "Bearer",
                    "expiresIn": 3600
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = client_for(&server)
            .await
            .exchange(proof("idtok123"))
            .await
            .unwrap();
        assert_eq!(session.access_token(), "A1");
        assert_eq!(session.refresh_token(), "R1");
        assert_eq!(session.expires_in(), Some(3600));
    }

    #[tokio::test]
    async fn exchange_http_failure_is_rejected_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(500).set_body_string("server error"))
            .expect(1)
            .mount(&server)
            .await;

        match client_for(&server).await.exchange(proof("idtok123")).await {
            Err(Error::BackendRejected { status, body, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "server error");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_unsuccessful_envelope_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "unknown user"
            })))
            .mount(&server)
            .await;

        match client_for(&server).await.exchange(proof("idtok123")).await {
            Err(Error::BackendRejected { status, body, .. }) => {
                assert_eq!(status, 200);
                assert_eq!(body, "unknown user");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_missing_token_is_malformed() {
        for data in [
            serde_json::json!({ "accessToken": "A1" }),
            serde_json::json!({ "refreshToken": "R1" }),
            serde_json::json!({ "accessToken": "", "refreshToken": "R1" }),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/auth/login"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({ "success": true, "data": data })),
                )
                .mount(&server)
                .await;

            let result = client_for(&server).await.exchange(proof("idtok123")).await;
            assert!(
                matches!(result, Err(Error::MalformedResponse { .. })),
                "expected malformed for {data}, got {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn exchange_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = client_for(&server).await.exchange(proof("idtok123")).await;
        assert!(matches!(result, Err(Error::MalformedResponse { .. })));
    }

    #[tokio::test]
    async fn reissue_sends_both_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/reissue"))
            .and(header("authorization", "Bearer A1"))
            .and(header(REFRESH_TOKEN_HEADER, "R1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": { "accessToken": "A2", "refreshToken": "R2" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let current = Session::new("A1", "R1").unwrap();
        let fresh = client_for(&server).await.reissue(&current).await.unwrap();
        assert_eq!(fresh.access_token(), "A2");
        assert_eq!(fresh.refresh_token(), "R2");
        assert_eq!(fresh.token_type(), "Bearer");
    }

    #[tokio::test]
    async fn exchange_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists(ID_TOKEN_HEADER))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = BackendConfig::new(server.uri().parse().unwrap())
            .with_timeout(std::time::Duration::from_millis(50));
        let result = BackendClient::new(config)
            .unwrap()
            .exchange(proof("idtok123"))
            .await;
        match result {
            Err(Error::Http(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
