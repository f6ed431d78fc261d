//! Signed session tokens binding a client to its cart.
//!
//! A token is `base64url(json).hex(hmac_sha256)`. Clients hold it opaquely
//! and send it back in the `x-session-token` header. Anything that fails
//! verification is treated as an empty session.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::HeaderValue;
use axum::http::request::Parts;
use axum::response::{IntoResponseParts, ResponseParts};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::{CartId, CustomerId};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use store::Store;

use crate::error::ApiError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the session token in both directions.
pub const SESSION_HEADER: &str = "x-session-token";

/// What the server remembers about a client between requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<CartId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
}

impl Session {
    pub fn with_cart(self, cart_id: CartId) -> Self {
        Self {
            cart_id: Some(cart_id),
            ..self
        }
    }
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    secret: Arc<[u8]>,
}

impl SessionKeys {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
        }
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, ApiError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| ApiError::Internal("invalid session key".to_string()))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, session: &Session) -> Result<String, ApiError> {
        let json = serde_json::to_vec(session)
            .map_err(|e| ApiError::Internal(format!("session encoding failed: {e}")))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = hex::encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    /// Returns the session if the token is well formed and correctly signed.
    pub fn verify(&self, token: &str) -> Option<Session> {
        let (payload, signature) = token.split_once('.')?;
        let signature = hex::decode(signature).ok()?;
        self.mac(payload).ok()?.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    /// Signs `session` into a response header.
    pub fn issue(&self, session: &Session) -> Result<SessionToken, ApiError> {
        let value = HeaderValue::from_str(&self.sign(session)?)
            .map_err(|e| ApiError::Internal(format!("session header invalid: {e}")))?;
        Ok(SessionToken(value))
    }
}

/// A freshly signed token, set on the response.
#[derive(Debug, Clone)]
pub struct SessionToken(HeaderValue);

impl IntoResponseParts for SessionToken {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.headers_mut().insert(SESSION_HEADER, self.0);
        Ok(res)
    }
}

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|token| {
                let verified = state.sessions.verify(token);
                if verified.is_none() {
                    tracing::debug!("ignoring session token that failed verification");
                }
                verified
            })
            .unwrap_or_default();
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::new("test-secret")
    }

    #[test]
    fn signed_token_verifies() {
        let session = Session {
            cart_id: Some(CartId::new()),
            customer_id: Some(CustomerId::new()),
        };
        let token = keys().sign(&session).unwrap();
        assert_eq!(keys().verify(&token), Some(session));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let keys = keys();
        let token = keys
            .sign(&Session::default().with_cart(CartId::new()))
            .unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_payload = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Session::default().with_cart(CartId::new())).unwrap(),
        );
        let forged = format!("{forged_payload}.{signature}");
        assert_eq!(keys.verify(&forged), None);
    }

    #[test]
    fn other_key_is_rejected() {
        let token = keys().sign(&Session::default()).unwrap();
        assert_eq!(SessionKeys::new("other").verify(&token), None);
        assert_eq!(keys().verify("garbage"), None);
        assert_eq!(keys().verify("a.zz"), None);
    }
}
