//! HTTP gateway for the keygate authentication service.
//!
//! This crate provides the public-facing API in front of a hosted identity
//! provider. It handles:
//!
//! - Password login, user registration and token refresh, forwarded to the
//!   identity provider
//! - Bearer token verification against the provider's published signing keys
//! - Serving the static front-end page
//! - Accepting JSON or form-encoded request bodies
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! │                    (Browser / HTTP)                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     keygate-gateway                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Bearer    │ │   Router    │ │    Static           │    │
//! │  │  Extractor  │ │  + Handlers │ │    index.html       │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     ┌────────┴────────┐
//!                     ▼                 ▼
//!              ┌────────────┐    ┌────────────┐
//!              │  Token     │    │  Identity  │
//!              │  Verifier  │    │  Provider  │
//!              └────────────┘    └────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keygate_gateway::{GatewayConfig, GatewayState, create_router};
//! use keygate_auth::{AuthConfig, IdpClient, IdpConfig, JwksVerifier, KeyCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let auth_config = AuthConfig::for_domain("tenant.eu.auth0.com", "https://api.example");
//! let keys = Arc::new(KeyCache::http(&auth_config)?);
//! let verifier = Arc::new(JwksVerifier::new(auth_config, keys));
//! let idp = Arc::new(IdpClient::new(IdpConfig::for_domain(
//!     "tenant.eu.auth0.com",
//!     "https://api.example",
//! ))?);
//!
//! let state = GatewayState::new(verifier, idp, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;

// Re-export key types for convenience
pub use auth::AuthUser;
