use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::limits::LimitKind;
use crate::providers::ProviderKind;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("no API keys registered")]
    NoApiKeys,

    #[error("no active API keys")]
    NoActiveKeys,

    #[error("specified API key not found or inactive")]
    InvalidKey,

    #[error("an API key with this name already exists")]
    DuplicateKey,

    #[error("API key not found")]
    KeyNotFound,

    #[error("{message}")]
    RateLimited {
        kind: LimitKind,
        message: String,
        retry_after: u64,
    },

    #[error("failed to decrypt API key")]
    Decryption {
        provider: ProviderKind,
        key_name: String,
        key_id: String,
    },

    #[error("{message}")]
    Provider {
        provider: ProviderKind,
        key_name: String,
        key_id: String,
        message: String,
    },

    #[error("failed to encrypt API key")]
    Encryption,

    #[error("internal error")]
    Internal,
}

impl ApiError {
    /// True for failures scoped to the acting key that should still bump its
    /// error counter before the response is returned.
    pub fn is_key_scoped(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::Decryption { .. } | ApiError::Provider { .. }
        )
    }

    /// True when an auto-selected primary attempt may retry once on another key.
    /// Throttling never triggers the fallback.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, ApiError::Decryption { .. } | ApiError::Provider { .. })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation Error", "message": message }),
            ),
            ApiError::NoApiKeys => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "No API Keys",
                    "message": "Please add at least one API key to start chatting",
                }),
            ),
            ApiError::NoActiveKeys => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "No Active Keys",
                    "message": "Please activate at least one API key",
                }),
            ),
            ApiError::InvalidKey => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Invalid Key",
                    "message": "Specified API key not found or inactive",
                }),
            ),
            ApiError::DuplicateKey => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Duplicate Key",
                    "message": "An API key with this name already exists",
                }),
            ),
            ApiError::KeyNotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "Not Found", "message": "API key not found" }),
            ),
            ApiError::RateLimited {
                kind,
                message,
                retry_after,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": kind.label(),
                    "message": message,
                    "retryAfter": retry_after,
                }),
            ),
            ApiError::Decryption {
                provider,
                key_name,
                key_id,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Decryption Error",
                    "message": "Failed to decrypt API key",
                    "provider": provider,
                    "keyName": key_name,
                    "keyId": key_id,
                }),
            ),
            ApiError::Provider {
                provider,
                key_name,
                key_id,
                message,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "AI Provider Error",
                    "message": message,
                    "provider": provider,
                    "keyName": key_name,
                    "keyId": key_id,
                }),
            ),
            ApiError::Encryption => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Encryption Error",
                    "message": "Failed to encrypt API key",
                }),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Internal Server Error",
                    "message": "Failed to process request",
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
