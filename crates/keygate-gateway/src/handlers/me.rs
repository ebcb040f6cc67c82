//! Protected identity endpoint.

use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::auth::AuthUser;

/// Response for `GET /api/me`.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    /// Subject of the verified token.
    pub sub: String,
    /// Scopes granted to the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Fixed marker message.
    pub message: &'static str,
}

/// Return the caller's identity from their verified bearer token.
pub async fn me(user: AuthUser) -> impl IntoResponse {
    tracing::debug!(sub = %user.subject, "Serving protected identity");

    Json(MeResponse {
        sub: user.subject,
        scope: user.scope,
        message: "Protected data from /api/me",
    })
}
