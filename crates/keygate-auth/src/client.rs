//! Identity provider client for login, registration and token refresh.
//!
//! Login and refresh use the provider's token endpoint with the `password`
//! and `refresh_token` grants. Registration first obtains a management token
//! through the `client_credentials` grant and then creates the user through
//! the management API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuthError, Result};
use crate::IdpConfig;

/// Request payload for username/password login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Username or email address.
    pub login: String,
    /// User's password.
    pub password: String,
}

/// Request payload for creating a user.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// Email address of the new user.
    pub email: String,
    /// Initial password of the new user.
    pub password: String,
}

/// Request payload for refreshing an access token.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    /// The refresh token obtained from login.
    pub refresh_token: String,
}

/// Tokens returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Access token for the configured API audience.
    pub access_token: String,
    /// Refresh token, present when `offline_access` was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: u64,
    /// Token type (normally `Bearer`).
    pub token_type: String,
}

/// Operations forwarded to the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a username and password for tokens.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if the provider refuses the
    /// login or cannot be reached.
    async fn login(&self, req: LoginRequest) -> Result<TokenGrant>;

    /// Create a user and return the provider's user record.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RegistrationFailed`] if the management token or
    /// the user cannot be created.
    async fn register(&self, req: RegisterRequest) -> Result<Value>;

    /// Exchange a refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RefreshFailed`] if the provider refuses the token.
    async fn refresh(&self, req: RefreshRequest) -> Result<TokenGrant>;
}

/// Form body of a `password` grant.
#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    grant_type: &'static str,
    username: &'a str,
    password: &'a str,
    client_id: &'a str,
    audience: &'a str,
    scope: &'static str,
}

/// Form body of a `client_credentials` grant.
#[derive(Debug, Serialize)]
struct ClientCredentialsGrant<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    audience: &'a str,
}

/// Form body of a `refresh_token` grant.
#[derive(Debug, Serialize)]
struct RefreshTokenGrant<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    refresh_token: &'a str,
}

/// JSON body of a management API user creation.
#[derive(Debug, Serialize)]
struct CreateUser<'a> {
    email: &'a str,
    password: &'a str,
    connection: &'a str,
}

/// Client for the identity provider's token and management APIs.
pub struct IdpClient {
    config: IdpConfig,
    client: reqwest::Client,
}

impl IdpClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: IdpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Obtain a management API token through the `client_credentials` grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses the machine credentials.
    pub async fn management_token(&self) -> Result<String> {
        let form = ClientCredentialsGrant {
            grant_type: "client_credentials",
            client_id: &self.config.m2m_client_id,
            client_secret: &self.config.m2m_client_secret,
            audience: self.config.management_audience(),
        };

        let grant = self.token_request(&form).await?;
        Ok(grant.access_token)
    }

    /// POST a form to the token endpoint and decode the grant.
    async fn token_request<F: Serialize + Sync>(&self, form: &F) -> Result<TokenGrant> {
        let response = self
            .client
            .post(self.config.token_url())
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("request failed: {e}")))?;

        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| AuthError::Internal(format!("invalid token response: {e}")))
    }

    /// Turn a non-success response into an error carrying the provider's body.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error_description")
                    .or_else(|| v.get("message"))
                    .or_else(|| v.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or(body);

        Err(AuthError::Internal(format!("HTTP {status}: {detail}")))
    }
}

#[async_trait]
impl IdentityProvider for IdpClient {
    async fn login(&self, req: LoginRequest) -> Result<TokenGrant> {
        let form = PasswordGrant {
            grant_type: "password",
            username: &req.login,
            password: &req.password,
            client_id: &self.config.client_id,
            audience: &self.config.audience,
            scope: "offline_access",
        };

        self.token_request(&form).await.map_err(|e| {
            tracing::error!(error = %e, "Identity provider login error");
            AuthError::InvalidCredentials
        })
    }

    async fn register(&self, req: RegisterRequest) -> Result<Value> {
        let result: Result<Value> = async {
            let token = self.management_token().await?;

            let body = CreateUser {
                email: &req.email,
                password: &req.password,
                connection: &self.config.default_connection,
            };

            let response = self
                .client
                .post(self.config.users_url())
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .map_err(|e| AuthError::Internal(format!("request failed: {e}")))?;

            let response = Self::check_status(response).await?;
            response
                .json::<Value>()
                .await
                .map_err(|e| AuthError::Internal(format!("invalid user response: {e}")))
        }
        .await;

        result.map_err(|e| {
            tracing::error!(error = %e, "Identity provider register error");
            AuthError::RegistrationFailed(e.to_string())
        })
    }

    async fn refresh(&self, req: RefreshRequest) -> Result<TokenGrant> {
        let form = RefreshTokenGrant {
            grant_type: "refresh_token",
            client_id: &self.config.client_id,
            refresh_token: &req.refresh_token,
        };

        self.token_request(&form).await.map_err(|e| {
            tracing::error!(error = %e, "Identity provider refresh error");
            AuthError::RefreshFailed(e.to_string())
        })
    }
}

/// A mock identity provider for testing.
///
/// Accepts any login whose password equals `password`, creates every user
/// with an email containing `@`, and accepts refresh tokens starting with
/// `refresh-`.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    /// The only password accepted by `login`.
    pub password: String,
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self {
            password: "correct-horse".to_string(),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn login(&self, req: LoginRequest) -> Result<TokenGrant> {
        if req.password != self.password {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(TokenGrant {
            access_token: format!("test-token:{}", req.login),
            refresh_token: Some(format!("refresh-{}", req.login)),
            expires_in: 86_400,
            token_type: "Bearer".to_string(),
        })
    }

    async fn register(&self, req: RegisterRequest) -> Result<Value> {
        if !req.email.contains('@') {
            return Err(AuthError::RegistrationFailed(
                "invalid email".to_string(),
            ));
        }
        Ok(serde_json::json!({
            "user_id": format!("auth0|{}", req.email),
            "email": req.email,
        }))
    }

    async fn refresh(&self, req: RefreshRequest) -> Result<TokenGrant> {
        let login = req
            .refresh_token
            .strip_prefix("refresh-")
            .ok_or_else(|| AuthError::RefreshFailed("unknown refresh token".to_string()))?;
        Ok(TokenGrant {
            access_token: format!("test-token:{login}"),
            refresh_token: None,
            expires_in: 86_400,
            token_type: "Bearer".to_string(),
        })
    }
}
