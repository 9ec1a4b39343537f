//! Example fixed-window rate limiter.
//!
//! Counts request cost per key inside a fixed window: the first charge of a
//! window starts its TTL, every charge adds to the counter, and the entry
//! expiring resets the window. Example-grade by design — bursty traffic at
//! a window boundary can briefly see up to twice the limit.
//!
//! Wire it up as a rate-limit hook:
//!
//! ```text
//! app.on(events::RATE_LIMIT, move |input| { … limiter.check(key, cost) … })
//! ```
//!
//! [`RateLimiter::check`] returns the `X-RateLimit-*` headers for the
//! response, or fails with a 429 carrying those same headers.

use std::sync::Arc;
use std::time::Duration;

use crate::error::HttpError;
use crate::status::Status;
use crate::store::KvStore;

/// Fixed-window counter over a [`KvStore`].
pub struct RateLimiter<S> {
    store: Arc<S>,
    limit: u64,
    window: Duration,
}

impl<S: KvStore> RateLimiter<S> {
    /// A limiter allowing `limit` units of cost per `window`.
    pub fn new(store: Arc<S>, limit: u64, window: Duration) -> Self {
        Self { store, limit, window }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Charges `cost` against `key` and returns the rate-limit headers.
    ///
    /// A zero cost never limits, regardless of how exhausted the window is:
    /// it reads the current count for the headers and charges nothing.
    pub async fn check(
        &self,
        key: &str,
        cost: u32,
    ) -> Result<Vec<(String, String)>, HttpError> {
        let used = if cost == 0 {
            self.current(key).await?
        } else {
            let used = self.store.increment(key, u64::from(cost)).await?;
            if used == u64::from(cost) {
                // First charge of this window starts the clock.
                self.store.expire(key, self.window).await?;
            }
            used
        };

        let reset = self
            .store
            .ttl(key)
            .await?
            .unwrap_or(self.window)
            .as_secs();
        let headers = self.headers(used, reset);

        if cost > 0 && used > self.limit {
            return Err(HttpError::with_headers(
                Status::TooManyRequests,
                "Rate limit exceeded",
                headers,
            ));
        }
        Ok(headers)
    }

    async fn current(&self, key: &str) -> Result<u64, HttpError> {
        let raw = self.store.get(key).await?;
        Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    fn headers(&self, used: u64, reset: u64) -> Vec<(String, String)> {
        vec![
            ("X-RateLimit-Limit".to_owned(), self.limit.to_string()),
            (
                "X-RateLimit-Remaining".to_owned(),
                self.limit.saturating_sub(used).to_string(),
            ),
            ("X-RateLimit-Reset".to_owned(), reset.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter(limit: u64) -> RateLimiter<MemoryStore> {
        RateLimiter::new(Arc::new(MemoryStore::new()), limit, Duration::from_secs(3600))
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> &'a str {
        headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str()).unwrap()
    }

    #[tokio::test]
    async fn counts_down_to_zero_then_limits() {
        let limiter = limiter(60);

        for i in 1..=60u64 {
            let headers = limiter.check("client", 1).await.unwrap();
            assert_eq!(header(&headers, "X-RateLimit-Remaining"), (60 - i).to_string());
        }

        let err = limiter.check("client", 1).await.unwrap_err();
        assert_eq!(err.status(), Status::TooManyRequests);
        let remaining = err
            .headers()
            .iter()
            .find(|(k, _)| k == "X-RateLimit-Remaining")
            .map(|(_, v)| v.as_str());
        assert_eq!(remaining, Some("0"));
    }

    #[tokio::test]
    async fn zero_cost_never_limits() {
        let limiter = limiter(2);
        // Exhaust the window, then keep probing at cost zero.
        limiter.check("client", 2).await.unwrap();
        assert!(limiter.check("client", 1).await.is_err());
        for _ in 0..100 {
            let headers = limiter.check("client", 0).await.unwrap();
            assert_eq!(header(&headers, "X-RateLimit-Remaining"), "0");
        }
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = limiter(1);
        limiter.check("a", 1).await.unwrap();
        assert!(limiter.check("a", 1).await.is_err());
        assert!(limiter.check("b", 1).await.is_ok());
    }

    #[tokio::test]
    async fn reset_header_reports_window_ttl() {
        let limiter = limiter(10);
        let headers = limiter.check("client", 1).await.unwrap();
        let reset: u64 = header(&headers, "X-RateLimit-Reset").parse().unwrap();
        assert!(reset <= 3600 && reset > 3590);
    }
}
