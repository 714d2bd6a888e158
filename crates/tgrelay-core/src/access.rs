//! Who may relay, and how often.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::UserId;

// ============== Allow-list ==============

/// An empty allow-list admits everyone; anonymous senders are always refused.
pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    allowed_users.is_empty() || allowed_users.contains(&user_id.0)
}

// ============== Rate Limiter (Token Bucket) ==============

#[derive(Clone, Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Per-user token bucket: `max_requests` burst, refilled evenly over `window`.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    enabled: bool,
    max_tokens: f64,
    refill_per_sec: f64,
    buckets: HashMap<UserId, Bucket>,
}

impl RateLimiter {
    pub fn new(enabled: bool, max_requests: u32, window: Duration) -> Self {
        let max_tokens = f64::from(max_requests.max(1));
        let window_secs = window.as_secs_f64().max(1e-9);

        Self {
            enabled,
            max_tokens,
            refill_per_sec: max_tokens / window_secs,
            buckets: HashMap::new(),
        }
    }

    pub fn check(&mut self, user_id: UserId) -> RateDecision {
        self.check_at(user_id, Instant::now())
    }

    pub fn check_at(&mut self, user_id: UserId, now: Instant) -> RateDecision {
        if !self.enabled {
            return RateDecision::Allowed;
        }

        let max_tokens = self.max_tokens;
        let refill_per_sec = self.refill_per_sec;
        // A bucket that has refilled completely is the same as no bucket.
        self.buckets.retain(|_, b| {
            let idle = now.saturating_duration_since(b.last_update).as_secs_f64();
            b.tokens + idle * refill_per_sec < max_tokens
        });

        let bucket = self.buckets.entry(user_id).or_insert_with(|| Bucket {
            tokens: max_tokens,
            last_update: now,
        });

        let elapsed = now
            .saturating_duration_since(bucket.last_update)
            .as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(max_tokens);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return RateDecision::Allowed;
        }

        let secs = (1.0 - bucket.tokens) / self.refill_per_sec;
        RateDecision::Limited {
            retry_after: Duration::from_secs_f64(secs.max(0.0)),
        }
    }

    /// Users currently tracked.
    pub fn tracked_users(&self) -> usize {
        self.buckets.len()
    }
}
