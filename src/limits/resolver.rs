//! Effective limit resolution: built-in per-model defaults merged with
//! per-key overrides. Pure table lookup, computed fresh per request.

use serde::Serialize;
use utoipa::ToSchema;

use crate::constants;
use crate::providers::ProviderKind;
use crate::store::RateLimitOverrides;

/// Fully resolved caps for one attempt. `None` means no cap and serializes
/// as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveLimits {
    pub requests_per_minute: Option<u64>,
    pub requests_per_day: Option<u64>,
    pub tokens_per_minute: Option<u64>,
    pub max_tokens_per_request: Option<u64>,
}

/// Merge the default table with per-key overrides, each field independently.
pub fn resolve(
    provider: ProviderKind,
    model: &str,
    overrides: &RateLimitOverrides,
) -> EffectiveLimits {
    let defaults = constants::model_defaults(provider, model);

    EffectiveLimits {
        requests_per_minute: overrides
            .requests_per_minute
            .resolve(defaults.requests_per_minute),
        requests_per_day: overrides.requests_per_day.resolve(defaults.requests_per_day),
        tokens_per_minute: overrides
            .tokens_per_minute
            .resolve(defaults.tokens_per_minute),
        max_tokens_per_request: overrides
            .max_tokens_per_request
            .resolve(defaults.max_tokens_per_request),
    }
}
