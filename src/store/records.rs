use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

use crate::providers::ProviderKind;

/// A per-field rate-limit override.
///
/// Encoded on the wire and on disk with the legacy sentinels: an absent or
/// empty field means use the built-in default, `null` (or `"unlimited"`)
/// lifts the cap entirely, and a positive number is an explicit cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ToSchema)]
pub enum LimitOverride {
    #[default]
    UseDefault,
    Unlimited,
    Explicit(u64),
}

impl LimitOverride {
    pub fn is_use_default(&self) -> bool {
        matches!(self, LimitOverride::UseDefault)
    }

    /// Resolve against a default-table value: None means no cap.
    pub fn resolve(&self, default: u64) -> Option<u64> {
        match self {
            LimitOverride::UseDefault => Some(default),
            LimitOverride::Unlimited => None,
            LimitOverride::Explicit(n) => Some(*n),
        }
    }
}

impl Serialize for LimitOverride {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LimitOverride::UseDefault => serializer.serialize_str(""),
            LimitOverride::Unlimited => serializer.serialize_none(),
            LimitOverride::Explicit(n) => serializer.serialize_u64(*n),
        }
    }
}

struct LimitOverrideVisitor;

impl<'de> Visitor<'de> for LimitOverrideVisitor {
    type Value = LimitOverride;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("null, \"unlimited\", an empty string, or a positive integer")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LimitOverride::Unlimited)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(LimitOverride::Unlimited)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(LimitOverrideVisitor)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(LimitOverride::Explicit(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        u64::try_from(value)
            .map(LimitOverride::Explicit)
            .map_err(|_| E::custom("limit override cannot be negative"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        match value {
            "" => Ok(LimitOverride::UseDefault),
            "unlimited" => Ok(LimitOverride::Unlimited),
            other => other
                .parse()
                .map(LimitOverride::Explicit)
                .map_err(|_| E::custom("limit override must be a number or \"unlimited\"")),
        }
    }
}

impl<'de> Deserialize<'de> for LimitOverride {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LimitOverrideVisitor)
    }
}

/// Per-key overrides, each field independent of the others
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitOverrides {
    #[serde(skip_serializing_if = "LimitOverride::is_use_default")]
    pub requests_per_minute: LimitOverride,
    #[serde(skip_serializing_if = "LimitOverride::is_use_default")]
    pub requests_per_day: LimitOverride,
    #[serde(skip_serializing_if = "LimitOverride::is_use_default")]
    pub tokens_per_minute: LimitOverride,
    #[serde(skip_serializing_if = "LimitOverride::is_use_default")]
    pub max_tokens_per_request: LimitOverride,
}

impl RateLimitOverrides {
    pub fn is_default(&self) -> bool {
        *self == RateLimitOverrides::default()
    }
}

/// Cumulative counters for one key, mutated only by the usage recorder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyUsageStats {
    pub requests: u64,
    pub tokens: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRecord {
    pub id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    /// Codec output; never exposed through API views
    pub encrypted_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_stats: KeyUsageStats,
    #[serde(default, skip_serializing_if = "RateLimitOverrides::is_default")]
    pub rate_limit_overrides: RateLimitOverrides,
}

impl ApiKeyRecord {
    /// Historical error rate used for key selection
    pub fn error_rate(&self) -> f64 {
        self.usage_stats.errors as f64 / self.usage_stats.requests.max(1) as f64
    }
}

/// User-level aggregate counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct UserUsageStats {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub last_request: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    #[serde(default)]
    pub usage_stats: UserUsageStats,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyRecord>,
}

impl UserRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_login: now,
            usage_stats: UserUsageStats::default(),
            api_keys: Vec::new(),
        }
    }
}
