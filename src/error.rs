#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The provider callback did not carry an identity token.
    #[error("Identity provider response carried no id_token")]
    MissingIdentityProof,

    /// The identity provider reported an error on the callback.
    #[error("Identity provider error: {error} ({description})")]
    Provider { error: String, description: String },

    /// Callback `state` (or the id_token `nonce`) did not match the pending login.
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// Non-success HTTP status, or a `success: false` envelope.
    #[error("{operation} rejected with status {status}: {body}")]
    BackendRejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Success status but the envelope lacked the expected fields.
    #[error("{operation} returned a malformed response: {detail}")]
    MalformedResponse {
        operation: &'static str,
        detail: String,
    },

    /// No session is stored.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Authorization failed and the session could not be reissued.
    #[error("Session expired")]
    SessionExpired,

    /// A session was constructed with an empty token.
    #[error("Invalid session: {0} is empty")]
    InvalidSession(&'static str),

    /// The request body is a stream and cannot be replayed after a reissue.
    #[error("Request cannot be retried: body is not cloneable")]
    RequestNotCloneable,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Transport failures worth retrying on an idempotent request.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Store(e.to_string())
    }
}
