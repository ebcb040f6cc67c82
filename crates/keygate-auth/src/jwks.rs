//! JWKS (JSON Web Key Set) fetching and key parsing.
//!
//! The remote key set is reached through the [`KeySource`] trait so that the
//! cache can be exercised against a deterministic source in tests.
//! [`HttpKeySource`] is the production implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use thiserror::Error;

use crate::error::{AuthError, KeyResolutionError, Result};

/// JWKS response from the identity provider.
#[derive(Debug, Deserialize)]
pub struct JwkSet {
    /// The list of keys.
    pub keys: Vec<Jwk>,
}

/// A single JWK (JSON Web Key).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwk {
    /// Key type (`RSA`, `EC` or `OKP`).
    pub kty: String,
    /// Key ID.
    pub kid: Option<String>,
    /// Algorithm (e.g., `RS256`).
    pub alg: Option<String>,
    /// Key use (`sig` or `enc`).
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url).
    pub n: Option<String>,
    /// RSA exponent (base64url).
    pub e: Option<String>,
    /// Curve for `EC` and `OKP` keys.
    pub crv: Option<String>,
    /// X coordinate or public key (base64url).
    pub x: Option<String>,
    /// Y coordinate (base64url).
    pub y: Option<String>,
}

/// A JWK that cannot be turned into a verification key.
#[derive(Debug, Error)]
#[error("invalid JWK: {0}")]
pub struct InvalidJwk(String);

/// A public signing key resolved from the key set.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Option<Algorithm>,
    key: DecodingKey,
}

impl SigningKey {
    /// Create a signing key from already decoded key material.
    #[must_use]
    pub fn new(kid: impl Into<String>, algorithm: Option<Algorithm>, key: DecodingKey) -> Self {
        Self {
            kid: kid.into(),
            algorithm,
            key,
        }
    }

    /// Parse a JWK into a signing key.
    ///
    /// Returns `Ok(None)` for keys that are well formed but not usable for
    /// signature verification here: encryption keys, keys without a `kid`,
    /// and unsupported key types or curves.
    ///
    /// # Errors
    ///
    /// Returns an error if a supported key is missing components or its
    /// components cannot be decoded.
    pub fn from_jwk(jwk: &Jwk) -> std::result::Result<Option<Self>, InvalidJwk> {
        if jwk.key_use.as_deref() == Some("enc") {
            return Ok(None);
        }
        let Some(kid) = jwk.kid.as_deref() else {
            return Ok(None);
        };

        let key = match jwk.kty.as_str() {
            "RSA" => {
                let n = component(jwk.n.as_ref(), "n")?;
                let e = component(jwk.e.as_ref(), "e")?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| InvalidJwk(format!("RSA key {kid}: {e}")))?
            }
            "EC" => {
                let crv = jwk.crv.as_deref().unwrap_or("");
                if crv != "P-256" && crv != "P-384" {
                    tracing::warn!(kid, crv, "Unsupported EC curve");
                    return Ok(None);
                }
                let x = component(jwk.x.as_ref(), "x")?;
                let y = component(jwk.y.as_ref(), "y")?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| InvalidJwk(format!("EC key {kid}: {e}")))?
            }
            "OKP" => {
                let crv = jwk.crv.as_deref().unwrap_or("");
                if crv != "Ed25519" {
                    tracing::warn!(kid, crv, "Unsupported OKP curve");
                    return Ok(None);
                }
                let x = component(jwk.x.as_ref(), "x")?;
                DecodingKey::from_ed_components(x)
                    .map_err(|e| InvalidJwk(format!("OKP key {kid}: {e}")))?
            }
            other => {
                tracing::warn!(kid, kty = other, "Unknown key type");
                return Ok(None);
            }
        };

        let algorithm = jwk.alg.as_deref().and_then(|a| a.parse().ok());

        Ok(Some(Self::new(kid, algorithm, key)))
    }

    /// The key id this key is published under.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The algorithm declared for this key, if any.
    #[must_use]
    pub const fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Key material for `jsonwebtoken::decode`.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn component<'a>(value: Option<&'a String>, name: &str) -> std::result::Result<&'a str, InvalidJwk> {
    value
        .map(String::as_str)
        .ok_or_else(|| InvalidJwk(format!("missing '{name}' parameter")))
}

/// Parse every usable key of a key set, skipping the rest.
#[must_use]
pub fn parse_key_set(set: &JwkSet) -> Vec<SigningKey> {
    let mut keys = Vec::with_capacity(set.keys.len());

    for jwk in &set.keys {
        match SigningKey::from_jwk(jwk) {
            Ok(Some(key)) => keys.push(key),
            Ok(None) => {
                tracing::debug!(kid = ?jwk.kid, kty = %jwk.kty, "Skipping JWK");
            }
            Err(e) => {
                tracing::warn!(kid = ?jwk.kid, kty = %jwk.kty, error = %e, "Failed to parse JWK, skipping");
            }
        }
    }

    keys
}

/// A remote source of signing keys.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the full key set published at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyResolutionError::FetchFailed`] if the set cannot be
    /// retrieved or parsed.
    async fn fetch_key_set(
        &self,
        url: &str,
    ) -> std::result::Result<Vec<SigningKey>, KeyResolutionError>;
}

/// Key source that fetches the key set over HTTPS.
pub struct HttpKeySource {
    client: reqwest::Client,
}

impl HttpKeySource {
    /// Create a source whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch_key_set(
        &self,
        url: &str,
    ) -> std::result::Result<Vec<SigningKey>, KeyResolutionError> {
        tracing::debug!(url = %url, "Fetching JWKS");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| KeyResolutionError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyResolutionError::FetchFailed(format!(
                "JWKS endpoint returned HTTP {status}"
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| KeyResolutionError::FetchFailed(e.to_string()))?;

        let keys = parse_key_set(&set);
        tracing::debug!(url = %url, count = keys.len(), "Parsed JWKS keys");

        Ok(keys)
    }
}
