//! Shared helpers for verification tests.
//!
//! Enabled by the `test-utils` feature. Provides two fixed RSA key pairs,
//! token minting helpers and a deterministic [`KeySource`].

#![allow(clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::KeyResolutionError;
use crate::jwks::{KeySource, SigningKey};

/// Key id the primary test key is published under.
pub const TEST_KID: &str = "test-key-1";

/// Issuer used by [`valid_claims`].
pub const TEST_ISSUER: &str = "https://idp.example/";

/// Audience used by [`valid_claims`].
pub const TEST_AUDIENCE: &str = "https://api.example";

/// Private half of the primary test key (PKCS#1 PEM).
pub const RSA_A_PEM: &str = include_str!("../testdata/rsa_a.pem");

/// Private half of the secondary test key (PKCS#1 PEM).
pub const RSA_B_PEM: &str = include_str!("../testdata/rsa_b.pem");

/// Modulus of the primary test key (base64url).
pub const RSA_A_MODULUS: &str = "26Inf6k2ZQsRencbAVw0nORYEZZt2CuCY5do_VPwzNZu3YDrCQephMS5A3Yg6tfMJdOGyZnK3RMHwwvlZntruGv2TySCel-rDsD9e-FYVyi4nVICdRIeGKEik_eQTik5WZjDbYVcvY5g1BRFVTQeQfH3z2n-mNaGl6PkOzRlFfJf7fEaLBfXroG7s_7qo7ryubVH0E-WuwMNEW69b1mvB6oHYLkqRtBpFg_V4odeilpJmfbLamgVB38X-AWCnu77Z_u51CfS_Ay4ki5kWKc9Q7r_-onKnB8YV5yXnrOsexJ5MVeYFUR9VTW0OmBsroeJSeGsRynhonfEaKu1WQRePw";

/// Modulus of the secondary test key (base64url).
pub const RSA_B_MODULUS: &str = "sdlV9gvqpDFjRDOmbuA19Cy6LuSEHQUw2tq-WWvbRXP8hcHjMv2Z86SIN1SWLh2EqD-nrd1RIO1c4bJhD2XTMI00ai_3-M8LUgEZp2jKfiAXRbTrnAuXfXcmXc-tUpZ31D7L3g--e_trRdMIuBDOiYmpHnbBAoFiiuJJIVZql7ACFkLSAN60977d__daMDdmXtBmaExmxSNdxS5_ZyvNSDLpFpsiEU6rYCQFBkJ2a63oADY2CU8oQQDlTmOYKTRw-v6ZNvpua2m5OAC_hb16kmpjHMDniMB21acLDbmNX0UXgZBNTLnbib3uW2qRC5SM-mWMVAjrkGsNtQ_lxWsFhQ";

/// Public exponent shared by both test keys (65537).
pub const RSA_EXPONENT: &str = "AQAB";

/// The primary test key's public half, published under `kid`.
#[must_use]
pub fn signing_key(kid: &str) -> SigningKey {
    public_key(kid, RSA_A_MODULUS)
}

/// An RSA public key with the given modulus, published under `kid`.
#[must_use]
pub fn public_key(kid: &str, modulus: &str) -> SigningKey {
    let key = DecodingKey::from_rsa_components(modulus, RSA_EXPONENT)
        .expect("test modulus is valid base64url");
    SigningKey::new(kid, Some(Algorithm::RS256), key)
}

/// A JWKS document publishing RSA keys as `(kid, modulus)` pairs.
#[must_use]
pub fn jwks_json(keys: &[(&str, &str)]) -> Value {
    let keys: Vec<Value> = keys
        .iter()
        .map(|(kid, n)| {
            json!({
                "kty": "RSA",
                "use": "sig",
                "alg": "RS256",
                "kid": kid,
                "n": n,
                "e": RSA_EXPONENT,
            })
        })
        .collect();
    json!({ "keys": keys })
}

/// Claims accepted by a verifier configured with [`TEST_ISSUER`] and
/// [`TEST_AUDIENCE`], expiring in one hour.
#[must_use]
pub fn valid_claims(subject: &str) -> Value {
    json!({
        "iss": TEST_ISSUER,
        "sub": subject,
        "aud": [TEST_AUDIENCE, "https://idp.example/userinfo"],
        "iat": Utc::now().timestamp(),
        "exp": Utc::now().timestamp() + 3600,
        "scope": "openid profile offline_access",
    })
}

/// Sign `claims` with the primary test key using RS256.
#[must_use]
pub fn mint_token(kid: &str, claims: &Value) -> String {
    mint_token_with_pem(RSA_A_PEM, kid, claims)
}

/// Sign `claims` with an RSA private key using RS256.
#[must_use]
pub fn mint_token_with_pem(pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("test key is valid PEM");
    jsonwebtoken::encode(&header, claims, &key).expect("token encodes")
}

/// Sign `claims` with a shared secret using HS256.
#[must_use]
pub fn mint_hs256_token(kid: &str, secret: &[u8], claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(secret)).expect("token encodes")
}

/// Build a token from raw header and claims JSON with an arbitrary signature.
///
/// Used for tokens no encoder would produce, such as `alg: none`.
#[must_use]
pub fn craft_raw_token(header: &Value, claims: &Value, signature: &str) -> String {
    let header = BASE64_URL_SAFE_NO_PAD.encode(header.to_string());
    let claims = BASE64_URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{claims}.{signature}")
}

/// A [`KeySource`] serving a fixed, replaceable key set.
#[derive(Default)]
pub struct StaticKeySource {
    keys: Mutex<Vec<SigningKey>>,
    fetches: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl StaticKeySource {
    /// Serve `keys` on every fetch.
    #[must_use]
    pub fn new(keys: Vec<SigningKey>) -> Self {
        Self {
            keys: Mutex::new(keys),
            ..Self::default()
        }
    }

    /// Sleep for `delay` before answering each fetch.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the served key set.
    pub fn set_keys(&self, keys: Vec<SigningKey>) {
        *self.keys.lock() = keys;
    }

    /// Make subsequent fetches fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of fetches performed so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn fetch_key_set(
        &self,
        _url: &str,
    ) -> std::result::Result<Vec<SigningKey>, KeyResolutionError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(KeyResolutionError::FetchFailed(
                "connection refused".to_string(),
            ));
        }
        Ok(self.keys.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_token_has_three_segments() {
        let token = mint_token(TEST_KID, &valid_claims("user-1"));
        assert_eq!(token.split('.').count(), 3);

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(TEST_KID));
    }

    #[test]
    fn raw_token_keeps_header_verbatim() {
        let token = craft_raw_token(&json!({"alg": "none"}), &json!({"sub": "x"}), "");
        let header = token.split('.').next().unwrap();
        let decoded = BASE64_URL_SAFE_NO_PAD.decode(header).unwrap();
        assert_eq!(decoded, br#"{"alg":"none"}"#);
    }

    #[test]
    fn jwks_document_lists_keys() {
        let doc = jwks_json(&[(TEST_KID, RSA_A_MODULUS)]);
        assert_eq!(doc["keys"][0]["kid"], TEST_KID);
        assert_eq!(doc["keys"][0]["e"], RSA_EXPONENT);
    }
}
