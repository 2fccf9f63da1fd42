//! Per-domain request pacing shared by every session in a run.
//!
//! A session calls [`RateLimiter::acquire`] before each operation that
//! issues a network request (navigation, clicks). Sessions targeting the
//! same domain are serialized to at most one request per
//! `min_interval`; different domains never wait on each other.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ScrapeError;

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Claims the next request slot for `domain` if it is free now.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::RateLimitBackoff`] with the remaining wait when
    /// the last request to `domain` was less than `min_interval` ago.
    pub fn try_acquire(&self, domain: &str) -> Result<(), ScrapeError> {
        match self.reserve(domain) {
            None => Ok(()),
            Some(wait) => Err(ScrapeError::RateLimitBackoff {
                domain: domain.to_owned(),
                wait,
            }),
        }
    }

    /// Waits until a request slot for `domain` is free and claims it.
    pub async fn acquire(&self, domain: &str) {
        while let Some(wait) = self.reserve(domain) {
            tracing::debug!(
                domain,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "rate limit: waiting for request slot"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Records a request now and returns `None`, or returns the wait left
    /// before `domain` may be hit again.
    fn reserve(&self, domain: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut table = self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(&last) = table.get(domain) {
            let ready_at = last + self.min_interval;
            if now < ready_at {
                return Some(ready_at - now);
            }
        }

        table.insert(domain.to_owned(), now);
        None
    }
}
