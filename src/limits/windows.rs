//! Multi-window rate tracking with atomic check-and-reserve.
//!
//! Counters are keyed by (user, provider, model, window kind, bucket index)
//! where the bucket index is floor(now_ms / window_len_ms). All three checks
//! and all three increments happen under one lock acquisition, so two
//! concurrent requests can never both slip past a cap. Counters are
//! process-local; multi-instance deployments need an external counter store.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::resolver::EffectiveLimits;
use crate::providers::ProviderKind;

pub const MINUTE_MS: u64 = 60_000;
pub const DAY_MS: u64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WindowKind {
    MinuteRequests,
    MinuteTokens,
    DayRequests,
}

impl WindowKind {
    fn len_ms(self) -> u64 {
        match self {
            WindowKind::MinuteRequests | WindowKind::MinuteTokens => MINUTE_MS,
            WindowKind::DayRequests => DAY_MS,
        }
    }
}

/// Which cap rejected the attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    DailyRequests,
    MinuteRequests,
    MinuteTokens,
}

impl LimitKind {
    pub fn label(self) -> &'static str {
        match self {
            LimitKind::DailyRequests => "Daily Rate Limited",
            LimitKind::MinuteRequests => "Model Rate Limited",
            LimitKind::MinuteTokens => "Token Rate Limited",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited {
        kind: LimitKind,
        retry_after_secs: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    user: String,
    provider: ProviderKind,
    model: String,
    kind: WindowKind,
    index: u64,
}

struct WindowCounter {
    count: u64,
    /// When the bucket first saw a request; drives retry-after
    first_seen_ms: u64,
}

#[derive(Default)]
pub struct RateWindowTracker {
    counters: Mutex<HashMap<CounterKey, WindowCounter>>,
}

impl RateWindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate daily requests, then minute requests, then minute tokens,
    /// short-circuiting on the first violation. On admission, reserves
    /// capacity in all three windows before returning; callers must not
    /// re-invoke for the same attempt.
    pub fn check_and_reserve(
        &self,
        user_id: &str,
        provider: ProviderKind,
        model: &str,
        limits: &EffectiveLimits,
        estimated_tokens: u64,
        now_ms: u64,
    ) -> Admission {
        let mut counters = self.counters.lock();
        evict_stale(&mut counters, now_ms);

        let key = |kind: WindowKind| CounterKey {
            user: user_id.to_string(),
            provider,
            model: model.to_string(),
            kind,
            index: now_ms / kind.len_ms(),
        };

        let day_key = key(WindowKind::DayRequests);
        let minute_key = key(WindowKind::MinuteRequests);
        let token_key = key(WindowKind::MinuteTokens);

        if let Some(limit) = limits.requests_per_day
            && let Some(counter) = counters.get(&day_key)
            && counter.count >= limit
        {
            return Admission::Limited {
                kind: LimitKind::DailyRequests,
                retry_after_secs: retry_after(DAY_MS, counter.first_seen_ms, now_ms),
            };
        }

        if let Some(limit) = limits.requests_per_minute
            && let Some(counter) = counters.get(&minute_key)
            && counter.count >= limit
        {
            return Admission::Limited {
                kind: LimitKind::MinuteRequests,
                retry_after_secs: retry_after(MINUTE_MS, counter.first_seen_ms, now_ms),
            };
        }

        // A missing counter is a logical zero; a single oversized estimate
        // must trip the cap even in a fresh bucket.
        if let Some(limit) = limits.tokens_per_minute {
            let (count, first_seen_ms) = counters
                .get(&token_key)
                .map_or((0, now_ms), |c| (c.count, c.first_seen_ms));
            if count + estimated_tokens > limit {
                return Admission::Limited {
                    kind: LimitKind::MinuteTokens,
                    retry_after_secs: retry_after(MINUTE_MS, first_seen_ms, now_ms),
                };
            }
        }

        bump(&mut counters, minute_key, 1, now_ms);
        bump(&mut counters, token_key, estimated_tokens, now_ms);
        bump(&mut counters, day_key, 1, now_ms);

        Admission::Allowed
    }
}

fn bump(
    counters: &mut HashMap<CounterKey, WindowCounter>,
    key: CounterKey,
    amount: u64,
    now_ms: u64,
) {
    counters
        .entry(key)
        .or_insert(WindowCounter {
            count: 0,
            first_seen_ms: now_ms,
        })
        .count += amount;
}

/// Seconds until the bucket that first saw a request at `first_seen_ms`
/// rolls over. Bucket-rollover time, not leaky-bucket smoothing.
fn retry_after(window_ms: u64, first_seen_ms: u64, now_ms: u64) -> u64 {
    (window_ms / 1000).saturating_sub(now_ms.saturating_sub(first_seen_ms) / 1000)
}

/// Drop buckets older than the previous one (strict age cutoff, so a bucket
/// a concurrent request is about to increment is never evicted).
fn evict_stale(counters: &mut HashMap<CounterKey, WindowCounter>, now_ms: u64) {
    let minute_cutoff = (now_ms / MINUTE_MS).saturating_sub(1);
    let day_cutoff = (now_ms / DAY_MS).saturating_sub(1);

    counters.retain(|key, _| match key.kind {
        WindowKind::DayRequests => key.index >= day_cutoff,
        WindowKind::MinuteRequests | WindowKind::MinuteTokens => key.index >= minute_cutoff,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(rpm: Option<u64>, rpd: Option<u64>, tpm: Option<u64>) -> EffectiveLimits {
        EffectiveLimits {
            requests_per_minute: rpm,
            requests_per_day: rpd,
            tokens_per_minute: tpm,
            max_tokens_per_request: Some(4000),
        }
    }

    fn check(
        tracker: &RateWindowTracker,
        limits: &EffectiveLimits,
        tokens: u64,
        now_ms: u64,
    ) -> Admission {
        tracker.check_and_reserve("u1", ProviderKind::Openai, "gpt-4o", limits, tokens, now_ms)
    }

    #[test]
    fn minute_request_cap_allows_n_rejects_n_plus_one() {
        let tracker = RateWindowTracker::new();
        let limits = limits(Some(20), Some(1000), Some(100_000));
        let start = 1_700_000_040_000;

        for i in 0..20 {
            assert_eq!(
                check(&tracker, &limits, 10, start + i * 100),
                Admission::Allowed
            );
        }

        match check(&tracker, &limits, 10, start + 2_100) {
            Admission::Limited {
                kind,
                retry_after_secs,
            } => {
                assert_eq!(kind, LimitKind::MinuteRequests);
                assert!(retry_after_secs > 0);
                assert!(retry_after_secs <= 60);
            }
            Admission::Allowed => panic!("21st request must be limited"),
        }
    }

    #[test]
    fn counter_resets_in_next_bucket() {
        let tracker = RateWindowTracker::new();
        let limits = limits(Some(1), None, None);
        let start = 1_700_000_040_000;

        assert_eq!(check(&tracker, &limits, 1, start), Admission::Allowed);
        assert!(matches!(
            check(&tracker, &limits, 1, start + 1000),
            Admission::Limited { .. }
        ));
        // Next minute bucket starts fresh
        assert_eq!(
            check(&tracker, &limits, 1, start + MINUTE_MS),
            Admission::Allowed
        );
    }

    #[test]
    fn token_cap_uses_estimate_sum() {
        let tracker = RateWindowTracker::new();
        let limits = limits(Some(100), None, Some(1000));
        let start = 1_700_000_040_000;

        assert_eq!(check(&tracker, &limits, 600, start), Admission::Allowed);
        match check(&tracker, &limits, 500, start + 100) {
            Admission::Limited { kind, .. } => assert_eq!(kind, LimitKind::MinuteTokens),
            Admission::Allowed => panic!("600 + 500 must exceed the 1000 token cap"),
        }
        // A smaller request still fits exactly
        assert_eq!(check(&tracker, &limits, 400, start + 200), Admission::Allowed);
    }

    #[test]
    fn oversized_first_request_trips_token_cap() {
        let tracker = RateWindowTracker::new();
        let limits = limits(Some(100), None, Some(100));
        let start = 1_700_000_040_000;

        // No counter exists yet for this bucket; the estimate alone blows
        // the cap, so the request must be rejected, not admitted
        match check(&tracker, &limits, 5000, start) {
            Admission::Limited {
                kind,
                retry_after_secs,
            } => {
                assert_eq!(kind, LimitKind::MinuteTokens);
                assert_eq!(retry_after_secs, 60);
            }
            Admission::Allowed => panic!("oversized first request must trip the token cap"),
        }

        // Nothing was reserved; a request that fits still passes
        assert_eq!(check(&tracker, &limits, 50, start + 100), Admission::Allowed);
    }

    #[test]
    fn daily_cap_checked_first() {
        let tracker = RateWindowTracker::new();
        let start = 1_700_000_040_000;

        // Exhaust one daily slot while the minute cap is also saturated
        assert_eq!(
            check(&tracker, &limits(Some(1), Some(1), None), 1, start),
            Admission::Allowed
        );
        match check(&tracker, &limits(Some(1), Some(1), None), 1, start + 100) {
            Admission::Limited { kind, .. } => assert_eq!(kind, LimitKind::DailyRequests),
            Admission::Allowed => panic!("daily cap must reject"),
        }
    }

    #[test]
    fn daily_bucket_is_utc_epoch_aligned() {
        let tracker = RateWindowTracker::new();
        let limits = limits(None, Some(1), None);
        // Just before a day boundary
        let before = 3 * DAY_MS - 1000;

        assert_eq!(check(&tracker, &limits, 1, before), Admission::Allowed);
        assert!(matches!(
            check(&tracker, &limits, 1, before + 500),
            Admission::Limited { .. }
        ));
        // Crossing floor(now / DAY_MS) resets the counter even though less
        // than 24h elapsed (fixed bucket, not rolling window)
        assert_eq!(
            check(&tracker, &limits, 1, 3 * DAY_MS + 1000),
            Admission::Allowed
        );
    }

    #[test]
    fn unlimited_field_never_rejects() {
        let tracker = RateWindowTracker::new();
        let limits = limits(Some(10_000), None, None);
        let start = 1_700_000_040_000;

        // Default daily cap would be 500; no cap means 600 in a day all pass
        for i in 0..600u64 {
            assert_eq!(
                check(&tracker, &limits, 1, start + i * 5000),
                Admission::Allowed,
                "request {i} should pass with an unlimited daily cap"
            );
        }
    }

    #[test]
    fn retry_after_counts_from_first_seen() {
        let tracker = RateWindowTracker::new();
        let limits = limits(Some(1), None, None);
        let bucket_start = 1_700_000_040_000;

        assert_eq!(check(&tracker, &limits, 1, bucket_start), Admission::Allowed);
        match check(&tracker, &limits, 1, bucket_start + 30_000) {
            Admission::Limited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 30),
            Admission::Allowed => panic!("must be limited"),
        }
    }

    #[test]
    fn counters_are_scoped_per_user_and_model() {
        let tracker = RateWindowTracker::new();
        let limits = limits(Some(1), None, None);
        let now = 1_700_000_040_000;

        assert_eq!(
            tracker.check_and_reserve("u1", ProviderKind::Openai, "gpt-4o", &limits, 1, now),
            Admission::Allowed
        );
        // Same model, other user: unaffected
        assert_eq!(
            tracker.check_and_reserve("u2", ProviderKind::Openai, "gpt-4o", &limits, 1, now),
            Admission::Allowed
        );
        // Same user, other model: unaffected
        assert_eq!(
            tracker.check_and_reserve("u1", ProviderKind::Openai, "gpt-4", &limits, 1, now),
            Admission::Allowed
        );
        assert!(matches!(
            tracker.check_and_reserve("u1", ProviderKind::Openai, "gpt-4o", &limits, 1, now),
            Admission::Limited { .. }
        ));
    }

    #[test]
    fn stale_buckets_are_evicted() {
        let tracker = RateWindowTracker::new();
        let limits = limits(Some(10), None, Some(1000));
        let start = 1_700_000_040_000;

        check(&tracker, &limits, 10, start);
        check(&tracker, &limits, 10, start + MINUTE_MS);
        // Previous bucket survives the 2-window lookback, older ones do not
        check(&tracker, &limits, 10, start + 3 * MINUTE_MS);

        let counters = tracker.counters.lock();
        let min_index = start / MINUTE_MS;
        assert!(
            !counters
                .keys()
                .any(|k| k.kind != WindowKind::DayRequests && k.index == min_index),
            "bucket two windows old must be evicted"
        );
        assert!(
            counters
                .keys()
                .any(|k| k.index == (start + 3 * MINUTE_MS) / MINUTE_MS),
            "current bucket must survive"
        );
    }

    #[test]
    fn concurrent_requests_never_exceed_cap() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU64, Ordering};

        let tracker = Arc::new(RateWindowTracker::new());
        let admitted = Arc::new(AtomicU64::new(0));
        let now = 1_700_000_040_000;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    let limits = EffectiveLimits {
                        requests_per_minute: Some(50),
                        requests_per_day: None,
                        tokens_per_minute: None,
                        max_tokens_per_request: None,
                    };
                    for i in 0..100 {
                        let at = now + i;
                        if tracker.check_and_reserve(
                            "u1",
                            ProviderKind::Openai,
                            "gpt-4o",
                            &limits,
                            1,
                            at,
                        ) == Admission::Allowed
                        {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 50);
    }
}
