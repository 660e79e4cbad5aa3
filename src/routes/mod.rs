//! HTTP surface: shared response types and edge validation.

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::store::{LimitOverride, RateLimitOverrides};

pub mod auth;
pub mod chat;
pub mod health;
pub mod keys;

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct SuccessResponse {
    pub message: String,
}

pub fn validate_message(message: &str) -> Result<(), ApiError> {
    let len = message.chars().count();
    if len == 0 {
        return Err(ApiError::Validation("Message is required".to_string()));
    }
    if len > 10_000 {
        return Err(ApiError::Validation(
            "Message must be 10000 characters or fewer".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_temperature(temperature: f32) -> Result<(), ApiError> {
    if !(0.0..=2.0).contains(&temperature) || !temperature.is_finite() {
        return Err(ApiError::Validation(
            "Temperature must be between 0 and 2".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_key_name(name: &str) -> Result<(), ApiError> {
    let len = name.chars().count();
    if len == 0 {
        return Err(ApiError::Validation("Key name is required".to_string()));
    }
    if len > 50 {
        return Err(ApiError::Validation(
            "Key name must be 50 characters or fewer".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_key_material(key: &str) -> Result<(), ApiError> {
    if key.chars().count() < 20 {
        return Err(ApiError::Validation(
            "API key appears too short to be valid".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_model(model: &str) -> Result<(), ApiError> {
    let len = model.chars().count();
    if len == 0 {
        return Err(ApiError::Validation("Model name is required".to_string()));
    }
    if len > 50 {
        return Err(ApiError::Validation(
            "Model name must be 50 characters or fewer".to_string(),
        ));
    }
    Ok(())
}

/// Explicit overrides must be positive; zero would silently block every
/// request on that key.
pub fn validate_overrides(overrides: &RateLimitOverrides) -> Result<(), ApiError> {
    let fields = [
        ("requestsPerMinute", overrides.requests_per_minute),
        ("requestsPerDay", overrides.requests_per_day),
        ("tokensPerMinute", overrides.tokens_per_minute),
        ("maxTokensPerRequest", overrides.max_tokens_per_request),
    ];
    for (field, value) in fields {
        if value == LimitOverride::Explicit(0) {
            return Err(ApiError::Validation(format!(
                "{field} must be a positive number or \"unlimited\""
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_bounds() {
        assert!(validate_message("hi").is_ok());
        assert!(validate_message("").is_err());
        assert!(validate_message(&"x".repeat(10_000)).is_ok());
        assert!(validate_message(&"x".repeat(10_001)).is_err());
    }

    #[test]
    fn temperature_bounds() {
        assert!(validate_temperature(0.0).is_ok());
        assert!(validate_temperature(2.0).is_ok());
        assert!(validate_temperature(-0.1).is_err());
        assert!(validate_temperature(2.1).is_err());
        assert!(validate_temperature(f32::NAN).is_err());
    }

    #[test]
    fn name_and_model_bounds() {
        assert!(validate_key_name("work key").is_ok());
        assert!(validate_key_name("").is_err());
        assert!(validate_key_name(&"n".repeat(51)).is_err());

        assert!(validate_model("gpt-4o").is_ok());
        assert!(validate_model(&"m".repeat(51)).is_err());
    }

    #[test]
    fn zero_override_rejected() {
        let overrides = RateLimitOverrides {
            requests_per_day: LimitOverride::Explicit(0),
            ..Default::default()
        };
        assert!(validate_overrides(&overrides).is_err());

        let overrides = RateLimitOverrides {
            requests_per_day: LimitOverride::Explicit(1),
            ..Default::default()
        };
        assert!(validate_overrides(&overrides).is_ok());
    }
}
