use std::time::Duration;

use bbcompare_core::FailureKind;
use thiserror::Error;

/// Classified failure raised by a driver operation or a session step.
///
/// `CookieBannerMissing` and `RateLimitBackoff` never end a session: the
/// first is logged and skipped, the second makes the caller wait.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("selector for {role} not found within {timeout_ms}ms")]
    SelectorNotFound { role: String, timeout_ms: u64 },

    #[error("cookie consent banner not found")]
    CookieBannerMissing,

    #[error("no addresses listed for postcode {postcode}")]
    NoAvailability { postcode: String },

    #[error("address {wanted:?} not among {listed} listed entries")]
    AddressNotFound { wanted: String, listed: usize },

    #[error("no deal containers found on {url}")]
    ExtractionEmpty { url: String },

    #[error("rate limited on {domain}; retry in {}ms", .wait.as_millis())]
    RateLimitBackoff { domain: String, wait: Duration },

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("page left the provider site: {url}")]
    UnexpectedNavigation { url: String },

    #[error("browser driver error: {0}")]
    Driver(String),

    #[error("run deadline exceeded")]
    DeadlineExceeded,

    #[error("session exceeded its {limit_ms}ms time cap")]
    SessionExpired { limit_ms: u64 },
}

impl ScrapeError {
    /// Failure recorded on the provider outcome when this error ends a session.
    ///
    /// Returns `None` for the classes that never terminate a session.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ScrapeError::NavigationTimeout { .. } => Some(FailureKind::NavigationTimeout),
            ScrapeError::SelectorNotFound { .. } => Some(FailureKind::SelectorNotFound),
            ScrapeError::NoAvailability { .. } => Some(FailureKind::NoAvailability),
            ScrapeError::AddressNotFound { .. } => Some(FailureKind::AddressNotFound),
            ScrapeError::ExtractionEmpty { .. } => Some(FailureKind::ExtractionEmpty),
            ScrapeError::UnexpectedNavigation { .. } => Some(FailureKind::UnexpectedNavigation),
            ScrapeError::Driver(_) => Some(FailureKind::Driver),
            ScrapeError::ConfigInvalid(_) => Some(FailureKind::ConfigInvalid),
            ScrapeError::DeadlineExceeded | ScrapeError::SessionExpired { .. } => {
                Some(FailureKind::Timeout)
            }
            ScrapeError::CookieBannerMissing | ScrapeError::RateLimitBackoff { .. } => None,
        }
    }

    /// `true` for the timeout and missing-element classes worth retrying in place.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScrapeError::NavigationTimeout { .. } | ScrapeError::SelectorNotFound { .. }
        )
    }
}

impl From<bbcompare_core::ConfigError> for ScrapeError {
    fn from(err: bbcompare_core::ConfigError) -> Self {
        ScrapeError::ConfigInvalid(err.to_string())
    }
}
