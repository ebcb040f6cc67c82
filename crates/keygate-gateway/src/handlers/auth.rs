//! Login, registration and token refresh endpoints.
//!
//! These handlers forward credentials to the identity provider and relay its
//! answer. They never inspect or store passwords. Bodies may be JSON or
//! form-encoded.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use keygate_auth::{
    IdentityProvider, LoginRequest, RefreshRequest, RegisterRequest, TokenVerifier,
};

use crate::error::ApiError;
use crate::extract::Payload;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for a successful registration.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    /// Human-readable confirmation.
    pub message: &'static str,
    /// The user record as returned by the identity provider.
    pub user: Value,
}

/// Request to refresh an access token.
///
/// The token is optional here so a missing field is reported as a
/// `400 Missing refresh_token` instead of a JSON rejection.
#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    /// Refresh token previously issued at login.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Response for a successful refresh.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token.
    pub access_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: u64,
    /// Token type, normally `Bearer`.
    pub token_type: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Exchange a login and password for tokens.
///
/// # Errors
///
/// Returns `400` for a malformed body and `401` if the identity provider
/// rejects the credentials.
pub async fn login<V, P>(
    State(state): State<Arc<GatewayState<V, P>>>,
    Payload(body): Payload<LoginRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    V: TokenVerifier + 'static,
    P: IdentityProvider + 'static,
{
    let grant = state.idp.login(body).await?;

    Ok(Json(grant))
}

/// Create a user in the identity provider's default connection.
///
/// # Errors
///
/// Returns `400` for a malformed body or if the identity provider refuses
/// to create the user.
pub async fn register<V, P>(
    State(state): State<Arc<GatewayState<V, P>>>,
    Payload(body): Payload<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    V: TokenVerifier + 'static,
    P: IdentityProvider + 'static,
{
    let user = state.idp.register(body).await?;

    Ok(Json(RegisterResponse {
        message: "User created",
        user,
    }))
}

/// Exchange a refresh token for a new access token.
///
/// # Errors
///
/// Returns `400` if the refresh token is missing or the identity provider
/// rejects it.
pub async fn refresh<V, P>(
    State(state): State<Arc<GatewayState<V, P>>>,
    Payload(body): Payload<RefreshBody>,
) -> Result<impl IntoResponse, ApiError>
where
    V: TokenVerifier + 'static,
    P: IdentityProvider + 'static,
{
    let refresh_token = body
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing refresh_token".to_string()))?;

    let grant = state.idp.refresh(RefreshRequest { refresh_token }).await?;

    Ok(Json(RefreshResponse {
        access_token: grant.access_token,
        expires_in: grant.expires_in,
        token_type: grant.token_type,
    }))
}
