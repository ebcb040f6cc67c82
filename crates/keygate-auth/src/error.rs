//! Authentication error types.

use std::fmt;

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during token verification or when talking to the
/// identity provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer token was presented, or the `Authorization` header is malformed.
    #[error("missing bearer token")]
    MissingToken,

    /// The token header or payload cannot be decoded.
    #[error("invalid token format: {0}")]
    InvalidToken(String),

    /// The token is signed with an algorithm other than the allowed one.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signing key referenced by the token could not be resolved.
    #[error("key resolution failed: {0}")]
    KeyResolution(#[from] KeyResolutionError),

    /// The JWT signature does not verify against the resolved key.
    #[error("invalid signature")]
    InvalidSignature,

    /// A registered claim does not match the expected value.
    #[error("claim mismatch: {0}")]
    ClaimMismatch(Claim),

    /// The identity provider rejected the supplied credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The identity provider refused to create the user.
    #[error("registration failed: {0}")]
    RegistrationFailed(String),

    /// The identity provider refused the refresh token.
    #[error("refresh failed: {0}")]
    RefreshFailed(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Why a key id could not be turned into a signing key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyResolutionError {
    /// The fetch budget for the current minute is exhausted.
    #[error("rate_limited")]
    RateLimited,

    /// The key set was fetched but does not contain the key id.
    #[error("key_not_found: {0}")]
    KeyNotFound(String),

    /// The key set could not be fetched or parsed.
    #[error("fetch_failed: {0}")]
    FetchFailed(String),
}

impl KeyResolutionError {
    /// Stable reason tag for this failure.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::KeyNotFound(_) => "key_not_found",
            Self::FetchFailed(_) => "fetch_failed",
        }
    }
}

/// A registered claim checked during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The `iss` claim.
    Issuer,
    /// The `aud` claim.
    Audience,
    /// The `exp` claim.
    Expiry,
}

impl Claim {
    /// Claim name as used in reason tags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Issuer => "issuer",
            Self::Audience => "audience",
            Self::Expiry => "expiry",
        }
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuthError {
    /// Returns `true` if this error is a rejection of a presented bearer token.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingToken
                | Self::InvalidToken(_)
                | Self::UnsupportedAlgorithm(_)
                | Self::KeyResolution(_)
                | Self::InvalidSignature
                | Self::ClaimMismatch(_)
        )
    }

    /// Stable, machine-readable reason for this error.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::MissingToken => "missing_token".to_string(),
            Self::InvalidToken(_) => "invalid_token".to_string(),
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm".to_string(),
            Self::KeyResolution(e) => format!("key_resolution_error:{}", e.reason()),
            Self::InvalidSignature => "invalid_signature".to_string(),
            Self::ClaimMismatch(claim) => format!("claim_mismatch:{claim}"),
            Self::InvalidCredentials => "invalid_credentials".to_string(),
            Self::RegistrationFailed(_) => "registration_failed".to_string(),
            Self::RefreshFailed(_) => "refresh_failed".to_string(),
            Self::Internal(_) => "internal_error".to_string(),
        }
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::MissingToken
            | Self::InvalidToken(_)
            | Self::UnsupportedAlgorithm(_)
            | Self::KeyResolution(_)
            | Self::InvalidSignature
            | Self::ClaimMismatch(_)
            | Self::InvalidCredentials => 401,
            Self::RegistrationFailed(_) | Self::RefreshFailed(_) => 400,
            Self::Internal(_) => 500,
        }
    }
}
