/// The limiter's backing store could not answer.
#[derive(Debug, thiserror::Error)]
#[error("rate limiter unavailable: {0}")]
pub struct LimiterUnavailable(pub String);

/// Admission check consulted before any token is looked at.
pub trait RateLimiter: Send + Sync {
    fn check(&self, client: &str, now: i64) -> Result<bool, LimiterUnavailable>;

    /// Fail-open: an unavailable limiter admits the request.
    fn allow(&self, client: &str, now: i64) -> bool {
        match self.check(client, now) {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::warn!(error = %err, "rate limiter unavailable; allowing request");
                true
            }
        }
    }
}

/// Admits everything; for setups where limiting happens upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn check(&self, _client: &str, _now: i64) -> Result<bool, LimiterUnavailable> {
        Ok(true)
    }
}
