//! One generic navigation flow for every provider.
//!
//! The machine walks `Init → CookieConsent → PostcodeEntry →
//! AddressSelection → FormCompletion → Extraction` using only the
//! provider's [`ProviderConfig`] and an [`AutomationDriver`]. A failed
//! state is handed to the [`RetryPolicy`](crate::retry::RetryPolicy),
//! which re-enters it, restarts from `Init`, or ends the session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bbcompare_core::RawExtraction;
use chrono::Utc;
use tokio::time::Instant;

use crate::driver::{AutomationDriver, SelectorRole, SCOPE_SELECTOR};
use crate::error::ScrapeError;
use crate::parse::clean_text;
use crate::retry::RetryDecision;
use crate::session::{CookieOutcome, SessionContext, SessionFailure, SessionReport, SessionState};

const ADDRESS_LABEL_KEY: &str = "label";

pub struct ProviderStateMachine {
    ctx: SessionContext,
    driver: Box<dyn AutomationDriver>,
    domain: String,
    cookie: Option<CookieOutcome>,
    selected_address: Option<String>,
    extractions: Vec<RawExtraction>,
    /// End of this session's own time cap, set when `run` starts.
    expires_at: Option<Instant>,
}

impl ProviderStateMachine {
    #[must_use]
    pub fn new(ctx: SessionContext, driver: Box<dyn AutomationDriver>) -> Self {
        let domain = ctx.provider.domain();
        Self {
            ctx,
            driver,
            domain,
            cookie: None,
            selected_address: None,
            extractions: Vec::new(),
            expires_at: None,
        }
    }

    /// Drives the session to a terminal state and closes the driver.
    pub async fn run(mut self) -> SessionReport {
        let started = Instant::now();
        self.expires_at = started.checked_add(self.ctx.policy.max_session);
        let provider = Arc::clone(&self.ctx.provider);
        let mut state = SessionState::Init;
        let mut attempts = 1u32;
        let mut trace = Vec::new();
        let mut failure: Option<ScrapeError> = None;

        tracing::info!(provider = %provider.id, postcode = %self.ctx.postcode, "session started");

        while !state.is_terminal() {
            if let Some((left, expired)) = self.time_left() {
                if left.is_zero() {
                    failure = Some(expired);
                    break;
                }
            }
            trace.push(state);

            let err = match self.run_state(state).await {
                Ok(()) => {
                    tracing::debug!(provider = %provider.id, %state, "state completed");
                    state = state.next();
                    continue;
                }
                Err(err) => err,
            };

            match self
                .ctx
                .policy
                .decide(&err, attempts, started.elapsed())
            {
                RetryDecision::RetrySameState { delay } => {
                    tracing::warn!(
                        provider = %provider.id,
                        %state,
                        attempt = attempts,
                        delay_ms = millis(delay),
                        error = %err,
                        "state failed, retrying in place"
                    );
                    if let Err(deadline) = self.pause(delay).await {
                        failure = Some(deadline);
                        break;
                    }
                    attempts += 1;
                }
                RetryDecision::RetryFromInit { delay } => {
                    tracing::warn!(
                        provider = %provider.id,
                        %state,
                        attempt = attempts,
                        delay_ms = millis(delay),
                        error = %err,
                        "state failed, restarting session"
                    );
                    if let Err(deadline) = self.pause(delay).await {
                        failure = Some(deadline);
                        break;
                    }
                    attempts += 1;
                    state = SessionState::Init;
                }
                RetryDecision::Abort => {
                    failure = Some(err);
                    state = SessionState::Failed;
                }
            }
        }

        let Self {
            driver,
            cookie,
            selected_address,
            extractions,
            ..
        } = self;

        if let Err(err) = driver.close().await {
            tracing::warn!(provider = %provider.id, error = %err, "failed to close driver");
        }

        let duration = started.elapsed();
        let result = match failure {
            None => {
                tracing::info!(
                    provider = %provider.id,
                    attempts,
                    deals = extractions.len(),
                    duration_ms = millis(duration),
                    "session succeeded"
                );
                Ok(extractions)
            }
            Some(err) => {
                tracing::warn!(
                    provider = %provider.id,
                    attempts,
                    error = %err,
                    duration_ms = millis(duration),
                    "session failed"
                );
                Err(SessionFailure::from(&err))
            }
        };

        SessionReport {
            provider_id: provider.id.clone(),
            provider_name: provider.name.clone(),
            attempts,
            cookie,
            selected_address,
            trace,
            duration,
            result,
        }
    }

    /// Time left before the nearer of the run deadline and the session cap,
    /// paired with the error raised when that limit is reached.
    fn time_left(&self) -> Option<(Duration, ScrapeError)> {
        let run = self
            .ctx
            .remaining()
            .map(|left| (left, ScrapeError::DeadlineExceeded));
        let session = self.expires_at.map(|at| {
            (
                at.saturating_duration_since(Instant::now()),
                ScrapeError::SessionExpired {
                    limit_ms: millis(self.ctx.policy.max_session),
                },
            )
        });
        match (run, session) {
            (Some(run), Some(session)) => Some(if run.0 <= session.0 { run } else { session }),
            (run, session) => run.or(session),
        }
    }

    /// Runs one state under the smaller of its own budget and the time
    /// left before the run deadline or session cap.
    async fn run_state(&mut self, state: SessionState) -> Result<(), ScrapeError> {
        let budget = self.ctx.provider.timeouts.state();
        let (limit, expired) = match self.time_left() {
            Some((left, expired)) if left < budget => (left, Some(expired)),
            _ => (budget, None),
        };

        let outcome = tokio::time::timeout(limit, self.step(state)).await;
        match (outcome, expired) {
            (Ok(result), _) => result,
            (Err(_), Some(expired)) => Err(expired),
            (Err(_), None) => Err(ScrapeError::NavigationTimeout {
                url: self.ctx.provider.base_url.clone(),
                timeout_ms: millis(limit),
            }),
        }
    }

    async fn step(&mut self, state: SessionState) -> Result<(), ScrapeError> {
        match state {
            SessionState::Init => self.open_landing_page().await,
            SessionState::CookieConsent => {
                self.cookie = Some(self.dismiss_cookies().await?);
                Ok(())
            }
            SessionState::PostcodeEntry => self.enter_postcode().await,
            SessionState::AddressSelection => self.select_address().await,
            SessionState::FormCompletion => self.complete_form().await,
            SessionState::Extraction => self.extract_deals().await,
            SessionState::Succeeded | SessionState::Failed => Ok(()),
        }
    }

    /// Sleeps before a retry without overrunning the run deadline or
    /// session cap.
    async fn pause(&self, delay: Duration) -> Result<(), ScrapeError> {
        match self.time_left() {
            Some((left, expired)) if left <= delay => {
                tokio::time::sleep(left).await;
                Err(expired)
            }
            _ => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    async fn throttle(&self) {
        self.ctx.limiter.acquire(&self.domain).await;
    }

    async fn open_landing_page(&mut self) -> Result<(), ScrapeError> {
        let provider = Arc::clone(&self.ctx.provider);
        self.cookie = None;
        self.selected_address = None;
        self.extractions.clear();

        self.throttle().await;
        self.driver
            .navigate(&provider.base_url, provider.timeouts.navigation())
            .await?;

        if SelectorRole::PageReady.resolve(&provider).is_some() {
            self.driver
                .wait_for(&SelectorRole::PageReady, provider.timeouts.element())
                .await?;
        }
        Ok(())
    }

    /// Rejects the consent banner if one shows up. A missing banner is
    /// logged and reported, never raised.
    async fn dismiss_cookies(&mut self) -> Result<CookieOutcome, ScrapeError> {
        let provider = Arc::clone(&self.ctx.provider);
        let role = SelectorRole::CookieReject;

        match self.driver.wait_for(&role, provider.timeouts.cookie()).await {
            Ok(()) => {}
            Err(err) if is_absent(&err) => {
                tracing::warn!(provider = %provider.id, "cookie banner not found, continuing");
                return Ok(CookieOutcome::Missing);
            }
            Err(err) => return Err(err),
        }

        self.throttle().await;
        match self.driver.click(&role).await {
            Ok(()) => Ok(CookieOutcome::Rejected),
            Err(err) if is_absent(&err) => {
                tracing::warn!(provider = %provider.id, "cookie banner vanished before reject, continuing");
                Ok(CookieOutcome::Missing)
            }
            Err(err) => Err(err),
        }
    }

    async fn enter_postcode(&mut self) -> Result<(), ScrapeError> {
        let provider = Arc::clone(&self.ctx.provider);
        let element = provider.timeouts.element();

        self.driver
            .wait_for(&SelectorRole::PostcodeField, element)
            .await?;
        self.driver
            .fill(&SelectorRole::PostcodeField, &self.ctx.postcode)
            .await?;
        self.throttle().await;
        self.driver.click(&SelectorRole::PostcodeSubmit).await?;

        match self
            .driver
            .wait_for(&SelectorRole::AddressResults, element)
            .await
        {
            Ok(()) => Ok(()),
            // Without a results marker an empty lookup looks like a missing
            // list; address selection reports it as no availability.
            Err(ScrapeError::SelectorNotFound { .. })
                if provider.selectors.address_results.is_none() =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn select_address(&mut self) -> Result<(), ScrapeError> {
        let label_map = BTreeMap::from([(
            ADDRESS_LABEL_KEY.to_owned(),
            SCOPE_SELECTOR.to_owned(),
        )]);
        let labels: Vec<String> = self
            .driver
            .extract_all(&SelectorRole::AddressList, &label_map)
            .await?
            .into_iter()
            .map(|mut entry| entry.remove(ADDRESS_LABEL_KEY).unwrap_or_default())
            .collect();

        if labels.is_empty() {
            return Err(ScrapeError::NoAvailability {
                postcode: self.ctx.postcode.clone(),
            });
        }

        let index = match &self.ctx.address {
            None => 0,
            Some(wanted) => {
                find_address(&labels, wanted).ok_or_else(|| ScrapeError::AddressNotFound {
                    wanted: wanted.clone(),
                    listed: labels.len(),
                })?
            }
        };

        self.throttle().await;
        self.driver.click(&SelectorRole::AddressOption(index)).await?;
        self.selected_address = Some(clean_text(&labels[index]));
        tracing::debug!(
            provider = %self.ctx.provider.id,
            address = ?self.selected_address,
            listed = labels.len(),
            "address selected"
        );
        Ok(())
    }

    async fn complete_form(&mut self) -> Result<(), ScrapeError> {
        let provider = Arc::clone(&self.ctx.provider);
        let element = provider.timeouts.element();

        for default in &provider.form_defaults {
            let role = SelectorRole::FormField(default.name.clone());
            self.driver.wait_for(&role, element).await?;
            self.throttle().await;
            self.driver.fill(&role, &default.value).await?;
            tracing::debug!(
                provider = %provider.id,
                field = %default.name,
                value = %default.value,
                "form default applied"
            );
        }

        if SelectorRole::FormSubmit.resolve(&provider).is_some() {
            self.throttle().await;
            self.driver.click(&SelectorRole::FormSubmit).await?;
        }
        Ok(())
    }

    async fn extract_deals(&mut self) -> Result<(), ScrapeError> {
        let provider = Arc::clone(&self.ctx.provider);
        let waited = self
            .driver
            .wait_for(&SelectorRole::DealContainer, provider.timeouts.element())
            .await;

        let url = self.driver.current_url().await?;
        if !provider.is_on_site(&url) {
            return Err(ScrapeError::UnexpectedNavigation { url });
        }

        match waited {
            Ok(()) => {}
            Err(err) if is_absent(&err) => return Err(ScrapeError::ExtractionEmpty { url }),
            Err(err) => return Err(err),
        }

        let rows = self
            .driver
            .extract_all(&SelectorRole::DealContainer, &provider.field_map())
            .await?;
        if rows.is_empty() {
            return Err(ScrapeError::ExtractionEmpty { url });
        }

        let extracted_at = Utc::now();
        self.extractions = rows
            .into_iter()
            .map(|fields| RawExtraction {
                provider_id: provider.id.clone(),
                provider_name: provider.name.clone(),
                postcode: self.ctx.postcode.clone(),
                address: self.selected_address.clone(),
                fields,
                source_url: url.clone(),
                extracted_at,
            })
            .collect();
        Ok(())
    }
}

/// Index of the address entry matching `wanted`: an exact match after
/// normalization first, then the first entry containing it.
fn find_address(labels: &[String], wanted: &str) -> Option<usize> {
    let wanted = normalize_address(wanted);
    if wanted.is_empty() {
        return None;
    }
    let normalized: Vec<String> = labels.iter().map(|l| normalize_address(l)).collect();
    normalized
        .iter()
        .position(|label| *label == wanted)
        .or_else(|| normalized.iter().position(|label| label.contains(&wanted)))
}

fn normalize_address(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_absent(err: &ScrapeError) -> bool {
    matches!(
        err,
        ScrapeError::SelectorNotFound { .. }
            | ScrapeError::NavigationTimeout { .. }
            | ScrapeError::CookieBannerMissing
    )
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn exact_address_match_wins_over_contains() {
        let listed = labels(&["Flat 10, 1 High Street", "1 High Street", "11 High Street"]);
        assert_eq!(find_address(&listed, "1 high street"), Some(1));
    }

    #[test]
    fn address_match_ignores_punctuation_and_spacing() {
        let listed = labels(&["10 Downing Street, London, SW1A 2AA"]);
        assert_eq!(find_address(&listed, "10  downing street london"), Some(0));
    }

    #[test]
    fn unknown_address_is_none() {
        let listed = labels(&["1 High Street", "2 High Street"]);
        assert_eq!(find_address(&listed, "99 Low Road"), None);
        assert_eq!(find_address(&listed, "  ,  "), None);
    }
}
