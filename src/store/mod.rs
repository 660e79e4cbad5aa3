pub mod records;
pub mod users;

pub use records::{
    ApiKeyRecord, KeyUsageStats, LimitOverride, RateLimitOverrides, UserRecord, UserUsageStats,
};
pub use users::{KeyPatch, StoreError, UserStore};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch; drives all rate-window bucket math.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
