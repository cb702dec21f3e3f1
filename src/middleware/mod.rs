//! Local login callback listener for Axum.
//!
//! Hosts the two halves of [`SessionBootstrap`](crate::SessionBootstrap) as
//! HTTP routes. The pending handshake travels between them in an encrypted,
//! short-lived cookie scoped to the callback path.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use aq_session::ClientSettings;
//! use aq_session::middleware::{CallbackConfig, callback_routes};
//!
//! let config = CallbackConfig::from_env()?;
//! let store = Arc::new(ClientSettings::from_env()?.file_store().ok_or("AQ_TOKEN_FILE unset")?);
//!
//! let app = axum::Router::new().merge(callback_routes(config, store));
//! ```

mod config;
mod cookies;
mod routes;
mod state;

pub use config::CallbackConfig;
pub use routes::callback_routes;

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
