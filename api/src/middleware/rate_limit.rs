use std::num::NonZeroU32;

use axum::extract::Request;
use governor::{DefaultKeyedRateLimiter, Quota};
use tower_governor::key_extractor::{KeyExtractor, PeerIpKeyExtractor, SmartIpKeyExtractor};

use lifeline_core::config::RateLimitSettings;
use lifeline_core::ratelimit::{LimiterUnavailable, RateLimiter};

/// Stale per-client buckets are dropped once this many are tracked.
const RETAIN_THRESHOLD: usize = 10_000;

/// In-memory keyed limiter for gateway requests, one bucket per client IP.
pub struct GovernorRateLimiter {
    inner: DefaultKeyedRateLimiter<String>,
}

impl GovernorRateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let per_minute = NonZeroU32::new(settings.per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(settings.burst).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: governor::RateLimiter::keyed(Quota::per_minute(per_minute).allow_burst(burst)),
        }
    }
}

impl RateLimiter for GovernorRateLimiter {
    fn check(&self, client: &str, _now: i64) -> Result<bool, LimiterUnavailable> {
        if self.inner.len() > RETAIN_THRESHOLD {
            self.inner.retain_recent();
        }
        Ok(self.inner.check_key(&client.to_string()).is_ok())
    }
}

/// Client identity for rate limiting. With `trust_forwarded` the proxy
/// headers win over the peer address; without it any client could pick its
/// own bucket by sending `X-Forwarded-For`.
pub fn client_key(req: &Request, trust_forwarded: bool) -> String {
    let ip = if trust_forwarded {
        SmartIpKeyExtractor.extract(req)
    } else {
        PeerIpKeyExtractor.extract(req)
    };
    ip.map(|ip| ip.to_string()).unwrap_or_else(|_| "unknown".to_string())
}
