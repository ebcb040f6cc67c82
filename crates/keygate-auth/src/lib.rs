//! Bearer token verification and identity provider access for keygate.
//!
//! This crate provides:
//!
//! - JWKS (JSON Web Key Set) fetching, caching and fetch rate limiting
//! - RS256 bearer token verification (signature, issuer, audience, expiry)
//! - A client for the hosted identity provider's token and management APIs
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │   Gateway        │────▶│  TokenVerifier   │
//! │   (HTTP)         │     │  (trait)         │
//! └────────┬─────────┘     └────────┬─────────┘
//!          │                        │
//!          │               ┌────────▼─────────┐
//!          │               │  JwksVerifier    │
//!          │               └────────┬─────────┘
//!          │                        │
//!          │               ┌────────▼─────────┐
//!          │               │  KeyCache        │
//!          │               │  (+ rate limit)  │
//!          │               └────────┬─────────┘
//!          │                        │ KeySource
//! ┌────────▼─────────┐     ┌────────▼─────────┐
//! │  IdpClient       │────▶│ Identity provider│
//! │  (login/refresh) │     │ token/jwks/users │
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keygate_auth::{AuthConfig, JwksVerifier, KeyCache, TokenVerifier};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::for_domain("tenant.example.com", "https://api.example.com");
//! let cache = Arc::new(KeyCache::http(&config)?);
//! let verifier = JwksVerifier::new(config, cache);
//!
//! // In a request handler:
//! let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9...";
//! let claims = verifier.verify(token).await?;
//!
//! println!("Subject: {}", claims.subject);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod client;
pub mod error;
pub mod jwks;
pub mod jwt;
pub mod rate_limit;
#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

use std::time::Duration;

use jsonwebtoken::Algorithm;

pub use cache::{KeyCache, KeyCacheStatus};
pub use client::{
    IdentityProvider, IdpClient, LoginRequest, RefreshRequest, RegisterRequest, TokenGrant,
};
pub use error::{AuthError, Claim, KeyResolutionError, Result};
pub use jwks::{HttpKeySource, KeySource, SigningKey};
pub use jwt::{bearer_token, JwksVerifier, TokenVerifier, VerifiedClaims};

#[cfg(any(test, feature = "test-utils"))]
pub use client::MockIdentityProvider;
#[cfg(any(test, feature = "test-utils"))]
pub use jwt::MockTokenVerifier;

/// Default number of JWKS fetches allowed per rolling minute.
pub const DEFAULT_FETCH_RATE_LIMIT_PER_MINUTE: u32 = 5;

/// Default lifetime of a fetched key set.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Default upper bound on a single JWKS fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for bearer token verification.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Expected `iss` claim, compared exactly.
    pub expected_issuer: String,
    /// Audience that must appear in the `aud` claim.
    pub expected_audience: String,
    /// The only signing algorithm tokens may declare.
    pub allowed_algorithm: Algorithm,
    /// JWKS endpoint URL.
    pub jwks_url: String,
    /// Maximum JWKS fetches per rolling minute, shared by all callers.
    pub fetch_rate_limit_per_minute: u32,
    /// How long a fetched key set is served before it is considered stale.
    pub cache_ttl: Duration,
    /// Tolerance applied to the `exp` check.
    pub clock_skew_tolerance: Duration,
    /// Upper bound on a single JWKS fetch.
    pub fetch_timeout: Duration,
}

impl AuthConfig {
    /// Configuration for a tenant reachable at `https://{domain}`.
    #[must_use]
    pub fn for_domain(domain: &str, audience: &str) -> Self {
        Self::for_base_url(&format!("https://{domain}"), audience)
    }

    /// Configuration for a tenant at an arbitrary base URL.
    ///
    /// The issuer is the base URL with a trailing slash and the key set is
    /// read from `/.well-known/jwks.json`.
    #[must_use]
    pub fn for_base_url(base_url: &str, audience: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            expected_issuer: format!("{base_url}/"),
            expected_audience: audience.to_string(),
            allowed_algorithm: Algorithm::RS256,
            jwks_url: format!("{base_url}/.well-known/jwks.json"),
            fetch_rate_limit_per_minute: DEFAULT_FETCH_RATE_LIMIT_PER_MINUTE,
            cache_ttl: DEFAULT_CACHE_TTL,
            clock_skew_tolerance: Duration::ZERO,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Configuration for the identity provider's token and management APIs.
#[derive(Debug, Clone)]
pub struct IdpConfig {
    /// Base URL of the tenant (e.g., `https://tenant.example.com`).
    pub base_url: String,
    /// API audience requested for user tokens.
    pub audience: String,
    /// Client id of the interactive application (password and refresh grants).
    pub client_id: String,
    /// Client id of the machine-to-machine application.
    pub m2m_client_id: String,
    /// Client secret of the machine-to-machine application.
    pub m2m_client_secret: String,
    /// Database connection new users are created in.
    pub default_connection: String,
    /// Audience requested for management tokens; falls back to `audience`.
    pub management_audience: Option<String>,
    /// Timeout applied to every outbound request.
    pub request_timeout: Duration,
}

impl IdpConfig {
    /// Configuration for a tenant reachable at `https://{domain}`.
    #[must_use]
    pub fn for_domain(domain: &str, audience: &str) -> Self {
        Self::for_base_url(&format!("https://{domain}"), audience)
    }

    /// Configuration for a tenant at an arbitrary base URL, with empty client credentials.
    #[must_use]
    pub fn for_base_url(base_url: &str, audience: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            audience: audience.to_string(),
            client_id: String::new(),
            m2m_client_id: String::new(),
            m2m_client_secret: String::new(),
            default_connection: "Username-Password-Authentication".to_string(),
            management_audience: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Get the token endpoint URL.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }

    /// Get the management API user collection URL.
    #[must_use]
    pub fn users_url(&self) -> String {
        format!("{}/api/v2/users", self.base_url)
    }

    /// Audience requested for management tokens.
    #[must_use]
    pub fn management_audience(&self) -> &str {
        self.management_audience.as_deref().unwrap_or(&self.audience)
    }
}
