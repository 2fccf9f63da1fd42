//! Retry decisions for failed state transitions.
//!
//! [`RetryPolicy::decide`] classifies a transition error and says whether
//! the session should re-enter the failed state, restart from `Init`, or
//! give up. Sleeping is left to the caller so the wait stays a cooperative
//! suspension point under the run deadline.

use std::time::Duration;

use crate::error::ScrapeError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetrySameState { delay: Duration },
    RetryFromInit { delay: Duration },
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries per session, the first one included.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Fraction of the delay applied as symmetric random jitter. `0.0` disables it.
    pub jitter: f64,
    /// Upper bound on one session's wall-clock time, retries included.
    pub max_session: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            jitter: 0.25,
            max_session: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Copy of this policy with a provider-specific attempt limit applied.
    #[must_use]
    pub fn with_max_attempts(&self, max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts: max_attempts.unwrap_or(self.max_attempts),
            ..self.clone()
        }
    }

    /// Decides what follows a failed transition.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed and
    /// `elapsed` the time the session has run so far.
    ///
    /// | Error class                               | Decision           |
    /// |-------------------------------------------|--------------------|
    /// | `NavigationTimeout`, `SelectorNotFound`   | retry same state   |
    /// | `UnexpectedNavigation`, `Driver`          | retry from `Init`  |
    /// | `RateLimitBackoff`                        | retry same state after the reported wait |
    /// | anything else                             | abort              |
    ///
    /// Any retry is turned into `Abort` once `attempt` reaches
    /// `max_attempts` or when sleeping would push the session past
    /// `max_session`.
    #[must_use]
    pub fn decide(&self, err: &ScrapeError, attempt: u32, elapsed: Duration) -> RetryDecision {
        let from_init = match err {
            ScrapeError::NavigationTimeout { .. } | ScrapeError::SelectorNotFound { .. } => false,
            ScrapeError::UnexpectedNavigation { .. } | ScrapeError::Driver(_) => true,
            ScrapeError::RateLimitBackoff { wait, .. } => {
                return if elapsed + *wait > self.max_session {
                    RetryDecision::Abort
                } else {
                    RetryDecision::RetrySameState { delay: *wait }
                };
            }
            ScrapeError::CookieBannerMissing
            | ScrapeError::NoAvailability { .. }
            | ScrapeError::AddressNotFound { .. }
            | ScrapeError::ExtractionEmpty { .. }
            | ScrapeError::ConfigInvalid(_)
            | ScrapeError::DeadlineExceeded
            | ScrapeError::SessionExpired { .. } => return RetryDecision::Abort,
        };

        if attempt >= self.max_attempts {
            return RetryDecision::Abort;
        }

        let delay = self.backoff(attempt);
        if elapsed + delay > self.max_session {
            return RetryDecision::Abort;
        }

        if from_init {
            RetryDecision::RetryFromInit { delay }
        } else {
            RetryDecision::RetrySameState { delay }
        }
    }

    /// Delay before the attempt after `attempt`: `base × 2^(attempt-1)`,
    /// capped at 30 s, then scaled by a random factor in `1 ± jitter`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let computed = self.backoff_base.saturating_mul(1u32 << exponent);
        let capped = computed.min(MAX_BACKOFF);
        if self.jitter <= 0.0 {
            return capped;
        }
        let jitter = self.jitter.min(1.0);
        let factor = 1.0 - jitter + rand::random::<f64>() * 2.0 * jitter;
        capped.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1_000),
            jitter: 0.0,
            max_session: Duration::from_secs(300),
        }
    }

    fn timeout() -> ScrapeError {
        ScrapeError::NavigationTimeout {
            url: "https://www.bt.com/broadband".to_owned(),
            timeout_ms: 30_000,
        }
    }

    #[test]
    fn transient_errors_retry_in_place() {
        assert_eq!(
            policy().decide(&timeout(), 1, Duration::ZERO),
            RetryDecision::RetrySameState {
                delay: Duration::from_millis(1_000)
            }
        );
        let missing = ScrapeError::SelectorNotFound {
            role: "postcode_field".to_owned(),
            timeout_ms: 10_000,
        };
        assert_eq!(
            policy().decide(&missing, 2, Duration::ZERO),
            RetryDecision::RetrySameState {
                delay: Duration::from_millis(2_000)
            }
        );
    }

    #[test]
    fn navigation_away_restarts_from_init() {
        let err = ScrapeError::UnexpectedNavigation {
            url: "https://example.com/".to_owned(),
        };
        assert!(matches!(
            policy().decide(&err, 1, Duration::ZERO),
            RetryDecision::RetryFromInit { .. }
        ));
        assert!(matches!(
            policy().decide(&ScrapeError::Driver("target closed".to_owned()), 1, Duration::ZERO),
            RetryDecision::RetryFromInit { .. }
        ));
    }

    #[test]
    fn terminal_classes_abort_immediately() {
        let p = policy();
        for err in [
            ScrapeError::NoAvailability {
                postcode: "SW1A 1AA".to_owned(),
            },
            ScrapeError::AddressNotFound {
                wanted: "10 Downing Street".to_owned(),
                listed: 4,
            },
            ScrapeError::ExtractionEmpty {
                url: "https://www.sky.com/deals".to_owned(),
            },
            ScrapeError::DeadlineExceeded,
        ] {
            assert_eq!(p.decide(&err, 1, Duration::ZERO), RetryDecision::Abort, "{err}");
        }
    }

    #[test]
    fn aborts_once_attempts_reach_the_limit() {
        let p = policy();
        assert!(matches!(
            p.decide(&timeout(), 2, Duration::ZERO),
            RetryDecision::RetrySameState { .. }
        ));
        assert_eq!(p.decide(&timeout(), 3, Duration::ZERO), RetryDecision::Abort);
        assert_eq!(p.decide(&timeout(), 7, Duration::ZERO), RetryDecision::Abort);
    }

    #[test]
    fn aborts_when_delay_would_exceed_session_budget() {
        let p = policy();
        assert_eq!(
            p.decide(&timeout(), 1, Duration::from_millis(299_500)),
            RetryDecision::Abort
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 20,
            ..policy()
        };
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
        assert_eq!(p.backoff(6), Duration::from_secs(30));
        assert_eq!(p.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = RetryPolicy {
            jitter: 0.25,
            ..policy()
        };
        for _ in 0..200 {
            let delay = p.backoff(2);
            assert!(delay >= Duration::from_millis(1_500), "{delay:?}");
            assert!(delay <= Duration::from_millis(2_500), "{delay:?}");
        }
    }

    #[test]
    fn provider_override_replaces_attempt_limit() {
        let p = policy().with_max_attempts(Some(5));
        assert_eq!(p.max_attempts, 5);
        assert_eq!(policy().with_max_attempts(None).max_attempts, 3);
    }
}
