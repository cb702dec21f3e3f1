#![doc = include_str!("../README.md")]

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod failure;
#[cfg(feature = "middleware")]
pub mod middleware;
pub mod oidc;
pub mod pkce;
pub mod request;
pub mod retry;
pub mod store;
pub mod types;
pub mod well_known;

// Re-exports for convenient access
pub use backend::{BackendClient, BackendConfig};
pub use bootstrap::{BootstrapOutcome, BootstrapPhase, SessionBootstrap};
pub use config::ClientSettings;
pub use error::Error;
pub use failure::{FailureRouter, Navigation};
pub use oidc::{BootstrapClient, CallbackParams, LoginRedirect, OidcConfig, PendingLogin};
pub use request::AuthenticatedClient;
pub use retry::RetryPolicy;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{ApiResponse, IdentityProof, Session, UserProfile};
pub use well_known::ProviderMetadata;
