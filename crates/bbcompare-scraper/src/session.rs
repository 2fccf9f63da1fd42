use std::sync::Arc;
use std::time::Duration;

use bbcompare_core::{FailureKind, ProviderConfig, RawExtraction};
use tokio::time::Instant;

use crate::error::ScrapeError;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

/// Everything one provider session needs besides its driver.
///
/// Owned by the session; only the rate limiter is shared with other
/// sessions.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub provider: Arc<ProviderConfig>,
    /// Canonical postcode, e.g. `"SW1A 1AA"`.
    pub postcode: String,
    /// Address entry to pick; the first listed entry when `None`.
    pub address: Option<String>,
    pub limiter: Arc<RateLimiter>,
    pub policy: RetryPolicy,
    /// Global run deadline, checked at every suspension point.
    pub deadline: Option<Instant>,
}

impl SessionContext {
    /// Time left before the run deadline, `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Init,
    CookieConsent,
    PostcodeEntry,
    AddressSelection,
    FormCompletion,
    Extraction,
    Succeeded,
    Failed,
}

impl SessionState {
    /// State entered after this one completes. Terminal states map to themselves.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            SessionState::Init => SessionState::CookieConsent,
            SessionState::CookieConsent => SessionState::PostcodeEntry,
            SessionState::PostcodeEntry => SessionState::AddressSelection,
            SessionState::AddressSelection => SessionState::FormCompletion,
            SessionState::FormCompletion => SessionState::Extraction,
            SessionState::Extraction | SessionState::Succeeded => SessionState::Succeeded,
            SessionState::Failed => SessionState::Failed,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Succeeded | SessionState::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Init => "Init",
            SessionState::CookieConsent => "CookieConsent",
            SessionState::PostcodeEntry => "PostcodeEntry",
            SessionState::AddressSelection => "AddressSelection",
            SessionState::FormCompletion => "FormCompletion",
            SessionState::Extraction => "Extraction",
            SessionState::Succeeded => "Succeeded",
            SessionState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// How the consent step ended. Neither outcome fails the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieOutcome {
    Rejected,
    /// No banner appeared within the cookie budget.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl SessionFailure {
    #[must_use]
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl From<&ScrapeError> for SessionFailure {
    fn from(err: &ScrapeError) -> Self {
        Self {
            kind: err.failure_kind().unwrap_or(FailureKind::Driver),
            reason: err.to_string(),
        }
    }
}

/// What a finished session hands to the aggregation channel.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub provider_id: String,
    pub provider_name: String,
    /// Tries made, the first one included.
    pub attempts: u32,
    pub cookie: Option<CookieOutcome>,
    pub selected_address: Option<String>,
    /// Every state entered, in order, retries included.
    pub trace: Vec<SessionState>,
    pub duration: Duration,
    /// Raw deals on success. Partial progress of a failed session is discarded.
    pub result: Result<Vec<RawExtraction>, SessionFailure>,
}

impl SessionReport {
    /// Report for a session that never reached its state machine.
    #[must_use]
    pub fn failed(
        provider: &ProviderConfig,
        attempts: u32,
        duration: Duration,
        failure: SessionFailure,
    ) -> Self {
        Self {
            provider_id: provider.id.clone(),
            provider_name: provider.name.clone(),
            attempts,
            cookie: None,
            selected_address: None,
            trace: Vec::new(),
            duration,
            result: Err(failure),
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    #[must_use]
    pub fn final_state(&self) -> SessionState {
        if self.succeeded() {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&SessionFailure> {
        self.result.as_ref().err()
    }
}
