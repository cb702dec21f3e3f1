use derive_more::{From, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Access/refresh token pair issued by the AQ backend.
///
/// Holding a `Session` proves both tokens are present and non-empty: there is
/// no partially populated session. Token values are redacted from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    access_token: String,
    refresh_token: String,
    token_type: String,
    expires_in: Option<u64>,
}

impl Session {
    /// Create a session from a token pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSession`] if either token is empty.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self, Error> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        if access_token.is_empty() {
            return Err(Error::InvalidSession("access token"));
        }
        if refresh_token.is_empty() {
            return Err(Error::InvalidSession("refresh token"));
        }
        Ok(Self {
            access_token,
            refresh_token,
            token_type: DEFAULT_TOKEN_TYPE.into(),
            expires_in: None,
        })
    }

    /// Override the token type (default: `"Bearer"`). Empty values are ignored.
    #[must_use]
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        let token_type = token_type.into();
        if !token_type.is_empty() {
            self.token_type = token_type;
        }
        self
    }

    /// Set the access token lifetime in seconds.
    #[must_use]
    pub fn with_expires_in(mut self, seconds: Option<u64>) -> Self {
        self.expires_in = seconds;
        self
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    #[must_use]
    pub fn expires_in(&self) -> Option<u64> {
        self.expires_in
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Signed identity token returned by the identity provider.
///
/// Single use: not `Clone`, consumed by value by
/// [`BackendClient::exchange`](crate::backend::BackendClient::exchange).
#[derive(PartialEq, Eq, From, Into)]
pub struct IdentityProof(String);

impl IdentityProof {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for IdentityProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityProof(<{} bytes>)", self.0.len())
    }
}

/// Envelope wrapping every AQ backend auth response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Signed-in user, as returned by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub nickname: String,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub level: i32,
}
