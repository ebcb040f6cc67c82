//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use keygate_auth::{IdentityProvider, TokenVerifier};

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
///
/// This struct holds references to all services needed by the HTTP handlers.
pub struct GatewayState<V, P>
where
    V: TokenVerifier,
    P: IdentityProvider,
{
    /// The bearer token verifier guarding protected routes.
    pub verifier: Arc<V>,
    /// The identity provider login, registration and refresh are forwarded to.
    pub idp: Arc<P>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<V, P> GatewayState<V, P>
where
    V: TokenVerifier,
    P: IdentityProvider,
{
    /// Create a new gateway state.
    #[must_use]
    pub const fn new(verifier: Arc<V>, idp: Arc<P>, config: GatewayConfig) -> Self {
        Self {
            verifier,
            idp,
            config,
        }
    }
}

impl<V, P> Clone for GatewayState<V, P>
where
    V: TokenVerifier,
    P: IdentityProvider,
{
    fn clone(&self) -> Self {
        Self {
            verifier: Arc::clone(&self.verifier),
            idp: Arc::clone(&self.idp),
            config: self.config.clone(),
        }
    }
}
