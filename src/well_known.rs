use serde::{Deserialize, Serialize};
use url::Url;

/// Path of the OIDC discovery document, relative to the issuer.
pub const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Subset of the OIDC discovery document the login handshake needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub jwks_uri: Option<Url>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

/// Discovery document URL for an issuer, tolerating a trailing slash.
#[must_use]
pub fn discovery_url(authority: &Url) -> Url {
    let mut url = authority.clone();
    let path = format!(
        "{}/{DISCOVERY_PATH}",
        authority.path().trim_end_matches('/')
    );
    url.set_path(&path);
    url
}
