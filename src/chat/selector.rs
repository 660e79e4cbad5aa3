//! Key selection over a user's active key set.

use crate::store::ApiKeyRecord;

/// Explicit key id did not match any active key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidKey;

/// Honor an explicit key id, or pick the statistically best candidate:
/// lowest historical error rate, then least recently used (never-used keys
/// sort first). The sort is stable, so full ties preserve input order.
pub fn select<'a>(
    active_keys: &'a [ApiKeyRecord],
    explicit_key_id: Option<&str>,
) -> Result<&'a ApiKeyRecord, InvalidKey> {
    if let Some(key_id) = explicit_key_id {
        return active_keys
            .iter()
            .find(|k| k.id == key_id)
            .ok_or(InvalidKey);
    }

    let mut candidates: Vec<&ApiKeyRecord> = active_keys.iter().collect();
    candidates.sort_by(|a, b| {
        a.error_rate()
            .partial_cmp(&b.error_rate())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let a_used = a.last_used.map(|t| t.timestamp_millis()).unwrap_or(0);
                let b_used = b.last_used.map(|t| t.timestamp_millis()).unwrap_or(0);
                a_used.cmp(&b_used)
            })
    });
    candidates.first().copied().ok_or(InvalidKey)
}
