//! Runs one provider session per selected provider on a bounded worker
//! pool and folds their reports into a single [`RunResult`].

use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bbcompare_core::{
    AppConfig, FailureKind, ProviderConfig, RunMetadata, RunResult, ScrapeRequest, TieBreak,
};
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use uuid::Uuid;

use crate::aggregate::ResultAggregator;
use crate::driver::DriverFactory;
use crate::error::ScrapeError;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::session::{SessionContext, SessionFailure, SessionReport};
use crate::state_machine::ProviderStateMachine;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Worker pool size. `None` means one worker per selected provider.
    pub max_concurrent_sessions: Option<usize>,
    pub concurrency_ceiling: usize,
    pub min_request_interval: Duration,
    pub retry: RetryPolicy,
    pub run_deadline: Option<Duration>,
    pub tie_break: Vec<TieBreak>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: None,
            concurrency_ceiling: 6,
            min_request_interval: Duration::from_millis(2_500),
            retry: RetryPolicy::default(),
            run_deadline: Some(Duration::from_secs(600)),
            tie_break: vec![TieBreak::Provider, TieBreak::DealName],
        }
    }
}

impl OrchestratorSettings {
    /// A zero `run_deadline_secs` disables the run deadline.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent_sessions: config.max_concurrent_sessions,
            concurrency_ceiling: config.concurrency_ceiling,
            min_request_interval: Duration::from_millis(config.min_request_interval_ms),
            retry: RetryPolicy {
                max_attempts: config.max_retries.max(1),
                backoff_base: Duration::from_millis(config.retry_backoff_base_ms),
                max_session: Duration::from_secs(config.max_session_secs),
                ..RetryPolicy::default()
            },
            run_deadline: (config.run_deadline_secs > 0)
                .then(|| Duration::from_secs(config.run_deadline_secs)),
            tie_break: config.tie_break.clone(),
        }
    }

    /// Workers to run for `provider_count` selected providers.
    #[must_use]
    pub fn pool_size(&self, provider_count: usize) -> usize {
        self.max_concurrent_sessions
            .unwrap_or(provider_count)
            .min(self.concurrency_ceiling)
            .max(1)
    }
}

pub struct SessionOrchestrator {
    providers: Vec<Arc<ProviderConfig>>,
    factory: Arc<dyn DriverFactory>,
    settings: OrchestratorSettings,
}

impl SessionOrchestrator {
    /// # Errors
    ///
    /// Returns [`ScrapeError::ConfigInvalid`] if any provider entry is
    /// unusable or two entries share an id.
    pub fn new(
        providers: Vec<ProviderConfig>,
        factory: Arc<dyn DriverFactory>,
        settings: OrchestratorSettings,
    ) -> Result<Self, ScrapeError> {
        let mut seen = HashSet::new();
        for provider in &providers {
            provider.validate()?;
            if !seen.insert(provider.id.as_str()) {
                return Err(ScrapeError::ConfigInvalid(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
        }
        Ok(Self {
            providers: providers.into_iter().map(Arc::new).collect(),
            factory,
            settings,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.id.as_str())
    }

    /// Providers named by the request, in request order without
    /// duplicates, or every configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::ConfigInvalid`] naming every unknown id.
    pub fn select(&self, request: &ScrapeRequest) -> Result<Vec<Arc<ProviderConfig>>, ScrapeError> {
        let Some(wanted) = &request.providers else {
            return Ok(self.providers.clone());
        };

        let mut selected = Vec::with_capacity(wanted.len());
        let mut unknown = Vec::new();
        for id in wanted {
            let id = id.trim().to_lowercase();
            match self.providers.iter().find(|p| p.id == id) {
                Some(provider) if !selected.iter().any(|p: &Arc<ProviderConfig>| p.id == id) => {
                    selected.push(Arc::clone(provider));
                }
                Some(_) => {}
                None => unknown.push(id),
            }
        }

        if !unknown.is_empty() {
            return Err(ScrapeError::ConfigInvalid(format!(
                "unknown provider id(s): {}",
                unknown.join(", ")
            )));
        }
        Ok(selected)
    }

    /// Runs every selected provider session and aggregates the results.
    ///
    /// Session failures never fail the run; they are recorded as
    /// per-provider outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::ConfigInvalid`] if the request names an
    /// unknown provider. No session is started in that case.
    pub async fn run(&self, request: &ScrapeRequest) -> Result<RunResult, ScrapeError> {
        let selected = self.select(request)?;
        let started_at = Utc::now();
        let deadline = self.settings.run_deadline.map(|d| Instant::now() + d);
        let pool = self.settings.pool_size(selected.len());
        let limiter = Arc::new(RateLimiter::new(self.settings.min_request_interval));
        let semaphore = Arc::new(Semaphore::new(pool));
        let (tx, mut rx) = mpsc::channel::<SessionReport>(selected.len().max(1));

        tracing::info!(
            postcode = %request.postcode,
            providers = selected.len(),
            pool,
            "scrape run started"
        );

        let mut handles = Vec::with_capacity(selected.len());
        for provider in &selected {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| ScrapeError::Driver(format!("worker pool closed: {e}")))?;

            let ctx = SessionContext {
                provider: Arc::clone(provider),
                postcode: request.postcode.clone(),
                address: request.address.clone(),
                limiter: Arc::clone(&limiter),
                policy: self.settings.retry.with_max_attempts(provider.max_retries),
                deadline,
            };
            let factory = Arc::clone(&self.factory);
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                let report = run_session(ctx, factory).await;
                if tx.send(report).await.is_err() {
                    tracing::error!("aggregation channel closed before report was sent");
                }
                drop(permit);
            }));
        }
        drop(tx);

        let mut aggregator = ResultAggregator::new(self.settings.tie_break.clone());
        let rules: BTreeMap<&str, &ProviderConfig> =
            selected.iter().map(|p| (p.id.as_str(), p.as_ref())).collect();
        while let Some(report) = rx.recv().await {
            match rules.get(report.provider_id.as_str()) {
                Some(provider) => aggregator.add_report(report, &provider.parsing),
                None => tracing::warn!(provider = %report.provider_id, "report for unselected provider dropped"),
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "session task failed to join");
            }
        }

        for provider in &selected {
            if !aggregator.has_outcome(&provider.id) {
                aggregator.add_missing(
                    &provider.id,
                    &provider.name,
                    "session ended without reporting",
                );
            }
        }

        let metadata = RunMetadata {
            run_id: Uuid::new_v4(),
            postcode: request.postcode.clone(),
            address: request.address.clone(),
            started_at,
            finished_at: Utc::now(),
        };
        let result = aggregator.finish(metadata);

        tracing::info!(
            run_id = %result.metadata.run_id,
            deals = result.deals.len(),
            usable = result.outcomes.iter().filter(|o| o.is_usable()).count(),
            failed = result.outcomes.iter().filter(|o| !o.is_usable()).count(),
            "scrape run finished"
        );
        Ok(result)
    }
}

/// Opens a driver and runs one state machine. Never panics: a panic inside
/// the session becomes a `Crashed` report.
async fn run_session(ctx: SessionContext, factory: Arc<dyn DriverFactory>) -> SessionReport {
    let provider = Arc::clone(&ctx.provider);
    let started = Instant::now();

    let session = async {
        let open = factory.open(&provider);
        let opened = match ctx.remaining() {
            Some(left) => tokio::time::timeout(left, open)
                .await
                .unwrap_or(Err(ScrapeError::DeadlineExceeded)),
            None => open.await,
        };
        match opened {
            Ok(driver) => ProviderStateMachine::new(ctx, driver).run().await,
            Err(err) => {
                tracing::warn!(provider = %provider.id, error = %err, "failed to open driver");
                SessionReport::failed(
                    &provider,
                    1,
                    started.elapsed(),
                    SessionFailure::from(&err),
                )
            }
        }
    };

    match AssertUnwindSafe(session).catch_unwind().await {
        Ok(report) => report,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            tracing::error!(provider = %provider.id, panic = %message, "session panicked");
            SessionReport::failed(
                &provider,
                1,
                started.elapsed(),
                SessionFailure::new(FailureKind::Crashed, format!("session panicked: {message}")),
            )
        }
    }
}
