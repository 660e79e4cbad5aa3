//! Bearer token verification.
//!
//! Tokens are `b64url(userId).expiryUnix.b64url(signature)` where the
//! signature is HMAC-SHA256 over the first two segments. The middleware
//! verifies the MAC in constant time, checks expiry, and injects
//! [`AuthUser`] for handlers to extract.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::AppState;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// User id injected by the auth middleware when `MODELGATE_DISABLE_AUTH` is set
pub const DEV_USER_ID: &str = "dev";

/// Authenticated user id, extracted from the request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Present on every request that passed the auth middleware
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Internal)
    }
}

pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    pub fn issue(&self, user_id: &str, ttl_secs: u64) -> String {
        let expiry = now_secs() + ttl_secs;
        let payload = format!("{}.{}", URL_SAFE_NO_PAD.encode(user_id), expiry);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&payload));
        format!("{payload}.{signature}")
    }

    /// Verify a token and return its user id, or None if the signature is
    /// wrong, the shape is wrong, or the token has expired.
    pub fn verify(&self, token: &str) -> Option<String> {
        let mut segments = token.split('.');
        let user_segment = segments.next()?;
        let expiry_segment = segments.next()?;
        let signature_segment = segments.next()?;
        if segments.next().is_some() {
            return None;
        }

        let payload = format!("{user_segment}.{expiry_segment}");
        let expected = self.sign(&payload);
        let provided = URL_SAFE_NO_PAD.decode(signature_segment).ok()?;
        if !bool::from(provided.as_slice().ct_eq(&expected)) {
            return None;
        }

        let expiry: u64 = expiry_segment.parse().ok()?;
        if expiry <= now_secs() {
            return None;
        }

        let user_bytes = URL_SAFE_NO_PAD.decode(user_segment).ok()?;
        String::from_utf8(user_bytes).ok()
    }

    fn sign(&self, payload: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Middleware protecting the API surface. Injects [`AuthUser`] on success.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: axum::extract::Request,
    next: Next,
) -> Response {
    if state.disable_auth {
        request
            .extensions_mut()
            .insert(AuthUser(DEV_USER_ID.to_string()));
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let user_id = token.and_then(|t| state.tokens.verify(t));

    match user_id {
        Some(user_id) => {
            request.extensions_mut().insert(AuthUser(user_id));
            next.run(request).await
        }
        None => unauthorized_response(),
    }
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Unauthorized",
            "message": "Missing or invalid bearer token",
        })),
    )
        .into_response()
}
