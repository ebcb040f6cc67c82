//! Keygate Gateway - HTTP API in front of a hosted identity provider
//!
//! This is the main entry point for the gateway service.
//!
//! # Dev Mode
//!
//! Build with `--features dev-mode` to replace the identity provider and the
//! token verifier with in-process mocks that need no network access.
//! Log in with any login and the password `correct-horse`, then call
//! protected routes with the returned `test-token:<sub>` token.

use std::path::PathBuf;
use std::str::FromStr;
#[cfg(not(feature = "dev-mode"))]
use std::sync::Arc;
#[cfg(not(feature = "dev-mode"))]
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "dev-mode")]
use keygate_auth::{MockIdentityProvider, MockTokenVerifier};
#[cfg(not(feature = "dev-mode"))]
use keygate_auth::{AuthConfig, IdpClient, IdpConfig, JwksVerifier, KeyCache};
use keygate_gateway::{create_router, GatewayConfig, GatewayState};

/// Read an environment variable, falling back to `default` when it is unset.
fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, falling back to `default` when it
/// is unset or unparsable.
fn env_parse<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, default = %default, "Ignoring unparsable value");
            default
        }),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,keygate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Keygate Gateway");

    // Load configuration from environment
    let port: u16 = env_parse("PORT", 3000);
    let gateway_config = GatewayConfig {
        listen_addr: format!("0.0.0.0:{port}"),
        index_file: PathBuf::from(env_or("INDEX_FILE", "index.html")),
        ..GatewayConfig::default()
    };

    #[cfg(feature = "dev-mode")]
    let (verifier, idp) = {
        tracing::warn!("DEV MODE ENABLED - using mock identity provider and token verifier");
        tracing::warn!("Use tokens in format: test-token:<sub>[:<scope>]");
        (
            std::sync::Arc::new(MockTokenVerifier),
            std::sync::Arc::new(MockIdentityProvider::default()),
        )
    };

    #[cfg(not(feature = "dev-mode"))]
    let (verifier, idp) = {
        let domain = std::env::var("IDP_DOMAIN")
            .map_err(|_| "IDP_DOMAIN must be set to the identity provider's domain")?;
        let audience = std::env::var("IDP_AUDIENCE")
            .map_err(|_| "IDP_AUDIENCE must be set to the API audience")?;

        let mut auth_config = AuthConfig::for_domain(&domain, &audience);
        auth_config.fetch_rate_limit_per_minute = env_parse(
            "JWKS_REQUESTS_PER_MINUTE",
            auth_config.fetch_rate_limit_per_minute,
        );
        auth_config.cache_ttl = Duration::from_secs(env_parse(
            "JWKS_CACHE_TTL_SECONDS",
            auth_config.cache_ttl.as_secs(),
        ));
        auth_config.clock_skew_tolerance =
            Duration::from_secs(env_parse("CLOCK_SKEW_SECONDS", 0));

        let mut idp_config = IdpConfig::for_domain(&domain, &audience);
        idp_config.client_id = env_or("IDP_CLIENT_ID", "");
        idp_config.m2m_client_id = env_or("IDP_M2M_CLIENT_ID", "");
        idp_config.m2m_client_secret = env_or("IDP_M2M_CLIENT_SECRET", "");
        idp_config.default_connection =
            env_or("IDP_DEFAULT_CONNECTION", &idp_config.default_connection);

        tracing::info!(
            domain = %domain,
            audience = %audience,
            jwks_url = %auth_config.jwks_url,
            fetches_per_minute = auth_config.fetch_rate_limit_per_minute,
            cache_ttl_secs = auth_config.cache_ttl.as_secs(),
            connection = %idp_config.default_connection,
            "Identity provider configuration loaded"
        );

        let keys = Arc::new(KeyCache::http(&auth_config)?);
        (
            Arc::new(JwksVerifier::new(auth_config, keys)),
            Arc::new(IdpClient::new(idp_config)?),
        )
    };
    tracing::info!("Token verifier initialized");

    let listen_addr = gateway_config.listen_addr.clone();
    let state = GatewayState::new(verifier, idp, gateway_config);

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
