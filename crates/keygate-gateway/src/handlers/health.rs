//! Liveness endpoint with signing key cache diagnostics.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use keygate_auth::{IdentityProvider, KeyCacheStatus, TokenVerifier};

use crate::state::GatewayState;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Cached key ids and remaining JWKS fetch budget. Absent when the
    /// verifier does not use a key cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<KeyCacheStatus>,
}

/// Report liveness and the state of the key cache.
///
/// Public; never triggers a JWKS fetch.
pub async fn health<V, P>(State(state): State<Arc<GatewayState<V, P>>>) -> impl IntoResponse
where
    V: TokenVerifier + 'static,
    P: IdentityProvider + 'static,
{
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        keys: state.verifier.key_cache_status(),
    })
}
