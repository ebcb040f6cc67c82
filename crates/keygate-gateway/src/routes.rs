//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeFile;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use keygate_auth::{IdentityProvider, TokenVerifier};

use crate::handlers::{auth, health, me};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /` - Front-end page
/// - `GET /health` - Health check
/// - `POST /api/login` - Password login
/// - `POST /api/register` - Create user
/// - `POST /api/refresh` - Refresh access token
///
/// ## Authenticated
/// - `GET /api/me` - Caller identity from the bearer token
pub fn create_router<V, P>(state: GatewayState<V, P>) -> Router
where
    V: TokenVerifier + 'static,
    P: IdentityProvider + 'static,
{
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();
    let index = ServeFile::new(&state.config.index_file);

    let state = Arc::new(state);

    Router::new()
        .route_service("/", index)
        .route("/health", get(health::health::<V, P>))
        .route("/api/login", post(auth::login::<V, P>))
        .route("/api/register", post(auth::register::<V, P>))
        .route("/api/refresh", post(auth::refresh::<V, P>))
        .route("/api/me", get(me::me))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use keygate_auth::testutil::{
        mint_hs256_token, mint_token, mint_token_with_pem, signing_key, valid_claims,
        StaticKeySource, RSA_B_PEM, TEST_AUDIENCE, TEST_ISSUER, TEST_KID,
    };
    use keygate_auth::{AuthConfig, JwksVerifier, KeyCache, MockIdentityProvider};

    use crate::config::GatewayConfig;

    fn test_auth_config() -> AuthConfig {
        let mut config = AuthConfig::for_base_url("https://idp.example", TEST_AUDIENCE);
        config.expected_issuer = TEST_ISSUER.to_string();
        config
    }

    fn test_server_with(config: GatewayConfig) -> TestServer {
        let auth_config = test_auth_config();
        let source = Arc::new(StaticKeySource::new(vec![signing_key(TEST_KID)]));
        let cache = Arc::new(KeyCache::new(&auth_config, source));
        let verifier = Arc::new(JwksVerifier::new(auth_config, cache));
        let idp = Arc::new(MockIdentityProvider::default());

        let state = GatewayState::new(verifier, idp, config);
        TestServer::new(create_router(state)).unwrap()
    }

    fn test_server() -> TestServer {
        test_server_with(GatewayConfig::default())
    }

    #[test]
    fn cors_any_origin() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn cors_specific_origins() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "https://app.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn health_is_public() {
        let server = test_server();

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["keys"]["cached_key_ids"], json!([]));
        assert_eq!(body["keys"]["remaining_fetches"], 5);
    }

    #[tokio::test]
    async fn health_reports_cached_keys() {
        let server = test_server();
        let token = mint_token(TEST_KID, &valid_claims("auth0|alice"));
        server
            .get("/api/me")
            .authorization_bearer(token)
            .await
            .assert_status_ok();

        let body: Value = server.get("/health").await.json();
        assert_eq!(body["keys"]["cached_key_ids"], json!([TEST_KID]));
        assert_eq!(body["keys"]["remaining_fetches"], 4);
    }

    #[tokio::test]
    async fn index_file_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.html");
        std::fs::write(&path, "<html><body>keygate</body></html>").unwrap();

        let server = test_server_with(GatewayConfig {
            index_file: path,
            ..GatewayConfig::default()
        });

        let response = server.get("/").await;
        response.assert_status_ok();
        assert!(response.text().contains("keygate"));
    }

    #[tokio::test]
    async fn me_requires_bearer_token() {
        let server = test_server();

        let response = server.get("/api/me").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "unauthorized");
        assert_eq!(body["error"]["reason"], "missing_token");
    }

    #[tokio::test]
    async fn me_returns_verified_identity() {
        let server = test_server();
        let token = mint_token(TEST_KID, &valid_claims("auth0|alice"));

        let response = server.get("/api/me").authorization_bearer(token).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["sub"], "auth0|alice");
        assert_eq!(body["scope"], "openid profile offline_access");
        assert_eq!(body["message"], "Protected data from /api/me");
    }

    #[tokio::test]
    async fn me_rejects_issuer_mismatch() {
        let server = test_server();
        let mut claims = valid_claims("auth0|alice");
        claims["iss"] = json!("https://evil.example/");
        let token = mint_token(TEST_KID, &claims);

        let response = server.get("/api/me").authorization_bearer(token).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"]["reason"], "claim_mismatch:issuer");
    }

    #[tokio::test]
    async fn me_rejects_foreign_signature() {
        let server = test_server();
        let token = mint_token_with_pem(RSA_B_PEM, TEST_KID, &valid_claims("auth0|alice"));

        let response = server.get("/api/me").authorization_bearer(token).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"]["reason"], "invalid_signature");
    }

    #[tokio::test]
    async fn me_rejects_symmetric_algorithm() {
        let server = test_server();
        let token = mint_hs256_token(TEST_KID, b"shared-secret", &valid_claims("auth0|alice"));

        let response = server.get("/api/me").authorization_bearer(token).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"]["reason"], "unsupported_algorithm");
    }

    #[tokio::test]
    async fn me_rejects_unknown_kid() {
        let server = test_server();
        let token = mint_token("rotated-away", &valid_claims("auth0|alice"));

        let response = server.get("/api/me").authorization_bearer(token).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(
            body["error"]["reason"],
            "key_resolution_error:key_not_found"
        );
    }

    #[tokio::test]
    async fn login_returns_tokens() {
        let server = test_server();

        let response = server
            .post("/api/login")
            .json(&json!({"login": "alice@example.com", "password": "correct-horse"}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["access_token"], "test-token:alice@example.com");
        assert_eq!(body["refresh_token"], "refresh-alice@example.com");
        assert_eq!(body["token_type"], "Bearer");
    }

    #[tokio::test]
    async fn login_accepts_form_body() {
        let server = test_server();

        let response = server
            .post("/api/login")
            .form(&json!({"login": "alice@example.com", "password": "correct-horse"}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["access_token"], "test-token:alice@example.com");
    }

    #[tokio::test]
    async fn refresh_accepts_form_body() {
        let server = test_server();

        let response = server
            .post("/api/refresh")
            .form(&json!({"refresh_token": "refresh-alice@example.com"}))
            .await;
        response.assert_status_ok();

        let response = server
            .post("/api/refresh")
            .form(&json!({"refresh_token": ""}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn me_omits_absent_scope() {
        let server = test_server();
        let mut claims = valid_claims("auth0|alice");
        claims.as_object_mut().unwrap().remove("scope");
        let token = mint_token(TEST_KID, &claims);

        let response = server.get("/api/me").authorization_bearer(token).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["sub"], "auth0|alice");
        assert!(body.get("scope").is_none());
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_unauthorized() {
        let server = test_server();

        let response = server
            .post("/api/login")
            .json(&json!({"login": "alice@example.com", "password": "wrong"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["error"]["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn login_with_malformed_body_is_bad_request() {
        let server = test_server();

        let response = server
            .post("/api/login")
            .json(&json!({"login": "alice@example.com"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_creates_user() {
        let server = test_server();

        let response = server
            .post("/api/register")
            .json(&json!({"email": "bob@example.com", "password": "hunter22"}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["message"], "User created");
        assert_eq!(body["user"]["email"], "bob@example.com");
    }

    #[tokio::test]
    async fn register_failure_is_bad_request() {
        let server = test_server();

        let response = server
            .post("/api/register")
            .json(&json!({"email": "not-an-email", "password": "hunter22"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"]["message"], "Cannot create user");
    }

    #[tokio::test]
    async fn refresh_requires_token() {
        let server = test_server();

        let response = server.post("/api/refresh").json(&json!({})).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "bad_request");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Missing refresh_token"));
    }

    #[tokio::test]
    async fn refresh_returns_new_access_token() {
        let server = test_server();

        let response = server
            .post("/api/refresh")
            .json(&json!({"refresh_token": "refresh-alice@example.com"}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["access_token"], "test-token:alice@example.com");
        assert_eq!(body["token_type"], "Bearer");
        assert!(body.get("refresh_token").is_none());
    }

    #[tokio::test]
    async fn refresh_rejection_is_bad_request() {
        let server = test_server();

        let response = server
            .post("/api/refresh")
            .json(&json!({"refresh_token": "garbage"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"]["message"], "Cannot refresh token");
    }
}
