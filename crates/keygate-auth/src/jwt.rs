//! Bearer token verification and claims extraction.
//!
//! A verification runs once through these stages and stops at the first
//! failure:
//!
//! ```text
//! Received → Parsed → KeyResolved → SignatureChecked → ClaimsChecked → Accepted
//! ```
//!
//! The declared algorithm is checked against the single allowed algorithm
//! before any key is looked up, so a token can never choose how it is verified.

use std::sync::Arc;

use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;

use crate::cache::{KeyCache, KeyCacheStatus};
use crate::error::{AuthError, Claim, Result};
use crate::AuthConfig;

/// Verified claims extracted from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    /// The `sub` claim.
    pub subject: String,
    /// Space-separated scopes granted to the token, if any.
    pub scope: Option<String>,
    /// The `iss` claim.
    pub issuer: String,
    /// Every audience listed in the `aud` claim.
    pub audience: Vec<String>,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

/// Trait for verifying bearer tokens.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a bearer token and extract its claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, uses a disallowed
    /// algorithm, references an unresolvable key, has a bad signature, or
    /// carries an unexpected issuer, audience or expiry.
    async fn verify(&self, token: &str) -> Result<VerifiedClaims>;

    /// State of the signing key cache behind this verifier, if it has one.
    fn key_cache_status(&self) -> Option<KeyCacheStatus> {
        None
    }
}

/// Extract the token from an `Authorization` header value.
///
/// # Errors
///
/// Returns [`AuthError::MissingToken`] if the header is absent, does not use
/// the `Bearer` scheme, or carries an empty token.
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
    let value = header.ok_or(AuthError::MissingToken)?;
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingToken);
    }

    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// The part of the JOSE header needed before the signature is trusted.
#[derive(Debug, Deserialize)]
struct UnverifiedHeader {
    alg: String,
    kid: Option<String>,
}

/// Raw claims from a token whose signature has been checked.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    iss: Option<String>,
    #[serde(default)]
    aud: Audience,
    /// NumericDate; may carry a fractional part.
    exp: Option<f64>,
    scope: Option<String>,
}

/// Audience claim that can be either a string or array.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Multiple(Vec<String>),
    #[default]
    None,
}

impl Audience {
    fn contains(&self, value: &str) -> bool {
        match self {
            Self::Single(s) => s == value,
            Self::Multiple(v) => v.iter().any(|s| s == value),
            Self::None => false,
        }
    }

    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s],
            Self::Multiple(v) => v,
            Self::None => Vec::new(),
        }
    }
}

/// JWKS-backed token verifier.
///
/// Keys are resolved through a shared [`KeyCache`]; claims are checked
/// against the expected issuer, audience and clock skew in [`AuthConfig`].
pub struct JwksVerifier {
    config: AuthConfig,
    keys: Arc<KeyCache>,
}

impl JwksVerifier {
    /// Create a verifier resolving keys through `keys`.
    #[must_use]
    pub const fn new(config: AuthConfig, keys: Arc<KeyCache>) -> Self {
        Self { config, keys }
    }

    /// Get the key cache backing this verifier.
    #[must_use]
    pub fn keys(&self) -> &KeyCache {
        &self.keys
    }

    /// Decode the header without trusting it and enforce the allowed algorithm.
    fn parse_header(&self, token: &str) -> Result<String> {
        let mut segments = token.split('.');
        let (Some(header), Some(_), Some(_), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(AuthError::InvalidToken(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|e| AuthError::InvalidToken(format!("header is not base64url: {e}")))?;
        let header: UnverifiedHeader = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::InvalidToken(format!("header is not valid JSON: {e}")))?;

        if header.alg.parse::<Algorithm>().ok() != Some(self.config.allowed_algorithm) {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }

        header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing kid header".to_string()))
    }

    /// Check issuer, audience and expiry against the configuration.
    ///
    /// Expiry is compared in milliseconds so fractional `exp` values and
    /// sub-second skew tolerances are honoured.
    #[allow(clippy::cast_precision_loss)]
    fn check_claims(&self, claims: &RawClaims, now_ms: i64) -> Result<()> {
        if claims.iss.as_deref() != Some(self.config.expected_issuer.as_str()) {
            return Err(AuthError::ClaimMismatch(Claim::Issuer));
        }

        if !claims.aud.contains(&self.config.expected_audience) {
            return Err(AuthError::ClaimMismatch(Claim::Audience));
        }

        let skew_ms = self.config.clock_skew_tolerance.as_secs_f64() * 1000.0;
        match claims.exp {
            Some(exp) if exp * 1000.0 + skew_ms > now_ms as f64 => Ok(()),
            _ => Err(AuthError::ClaimMismatch(Claim::Expiry)),
        }
    }
}

/// Convert a NumericDate to a timestamp, saturating outside chrono's range.
#[allow(clippy::cast_possible_truncation)]
fn numeric_date(exp: f64) -> DateTime<Utc> {
    let millis = (exp * 1000.0).floor() as i64;
    DateTime::from_timestamp_millis(millis).unwrap_or(if millis < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims> {
        let kid = self.parse_header(token).inspect_err(|e| {
            tracing::debug!(error = %e, "Token rejected while parsing header");
        })?;

        let key = self.keys.resolve(&kid).await.map_err(|e| {
            tracing::debug!(kid = %kid, reason = e.reason(), "Token rejected: key unresolved");
            AuthError::KeyResolution(e)
        })?;

        // A key published for another algorithm must not verify this token.
        if let Some(declared) = key.algorithm() {
            if declared != self.config.allowed_algorithm {
                tracing::debug!(kid = %kid, ?declared, "Token rejected: key declares another algorithm");
                return Err(AuthError::InvalidSignature);
            }
        }

        // Only the signature is checked here; claims are checked below so
        // that each failure maps to its own rejection.
        let mut validation = Validation::new(self.config.allowed_algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data =
            decode::<RawClaims>(token, key.decoding_key(), &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidAlgorithm
                    | ErrorKind::InvalidKeyFormat
                    | ErrorKind::InvalidRsaKey(_)
                    | ErrorKind::InvalidEcdsaKey => {
                        tracing::debug!(kid = %kid, "Token rejected: signature mismatch");
                        AuthError::InvalidSignature
                    }
                    _ => AuthError::InvalidToken(e.to_string()),
                }
            })?;

        let claims = token_data.claims;
        self.check_claims(&claims, Utc::now().timestamp_millis())
            .inspect_err(|e| tracing::debug!(kid = %kid, error = %e, "Token rejected"))?;

        let subject = claims
            .sub
            .ok_or_else(|| AuthError::InvalidToken("missing sub claim".to_string()))?;
        let expires_at = numeric_date(claims.exp.unwrap_or_default());

        Ok(VerifiedClaims {
            subject,
            scope: claims.scope,
            issuer: claims.iss.unwrap_or_default(),
            audience: claims.aud.into_vec(),
            expires_at,
        })
    }

    fn key_cache_status(&self) -> Option<KeyCacheStatus> {
        Some(self.keys.status())
    }
}

/// A mock token verifier for testing.
///
/// Accepts tokens in the format `test-token:<subject>` or
/// `test-token:<subject>:<scope>`.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockTokenVerifier;

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl TokenVerifier for MockTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims> {
        let rest = token.strip_prefix("test-token:").ok_or_else(|| {
            AuthError::InvalidToken("expected test-token:<subject>[:<scope>]".to_string())
        })?;

        let (subject, scope) = match rest.split_once(':') {
            Some((subject, scope)) => (subject, Some(scope.to_string())),
            None => (rest, None),
        };
        if subject.is_empty() {
            return Err(AuthError::InvalidToken("empty subject".to_string()));
        }

        Ok(VerifiedClaims {
            subject: subject.to_string(),
            scope,
            issuer: "test-issuer".to_string(),
            audience: vec!["test-audience".to_string()],
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}
