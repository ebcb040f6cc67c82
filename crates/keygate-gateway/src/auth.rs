//! Authentication extractor.
//!
//! This module provides the `AuthUser` extractor that verifies bearer tokens
//! and exposes the caller's identity to handlers.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use keygate_auth::{bearer_token, IdentityProvider, TokenVerifier, VerifiedClaims};

use crate::error::ApiError;
use crate::state::GatewayState;

/// An authenticated caller extracted from a bearer token.
///
/// This extractor verifies the `Authorization: Bearer <token>` header and
/// rejects the request with `401` if verification fails.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The identity provider's subject identifier.
    pub subject: String,
    /// Scopes granted to the token.
    pub scope: Option<String>,
    /// All verified claims.
    pub claims: VerifiedClaims,
}

impl AuthUser {
    /// Create an `AuthUser` from verified claims.
    #[must_use]
    pub fn from_claims(claims: VerifiedClaims) -> Self {
        Self {
            subject: claims.subject.clone(),
            scope: claims.scope.clone(),
            claims,
        }
    }
}

impl<V, P> FromRequestParts<Arc<GatewayState<V, P>>> for AuthUser
where
    V: TokenVerifier + 'static,
    P: IdentityProvider + 'static,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<GatewayState<V, P>>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let header = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            let token = bearer_token(header)?;
            let claims = state.verifier.verify(token).await?;

            Ok(AuthUser::from_claims(claims))
        })
    }
}
