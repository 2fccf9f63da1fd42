//! Merging session reports into one ordered [`RunResult`].

use std::cmp::Ordering;
use std::collections::BTreeMap;

use bbcompare_core::{
    FailureKind, NormalizedDeal, ParsingRules, ProviderOutcome, ProviderStatus, RunMetadata,
    RunResult, TieBreak,
};

use crate::normalize::normalize;
use crate::session::SessionReport;

/// Collects per-provider results as sessions finish, in any order, and
/// produces a deterministic [`RunResult`].
#[derive(Debug, Default)]
pub struct ResultAggregator {
    tie_break: Vec<TieBreak>,
    deals: BTreeMap<String, Vec<NormalizedDeal>>,
    outcomes: BTreeMap<String, ProviderOutcome>,
}

impl ResultAggregator {
    #[must_use]
    pub fn new(tie_break: Vec<TieBreak>) -> Self {
        Self {
            tie_break,
            ..Self::default()
        }
    }

    /// Normalizes a finished session's extractions and records its outcome.
    ///
    /// Deals with no parseable metric are dropped and logged; a successful
    /// session that lost any deal this way is marked `partial`.
    pub fn add_report(&mut self, report: SessionReport, rules: &ParsingRules) {
        let duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX);

        let outcome = match report.result {
            Err(failure) => ProviderOutcome {
                provider_id: report.provider_id.clone(),
                provider_name: report.provider_name,
                status: ProviderStatus::Failed,
                failure: Some(failure.kind),
                reason: Some(failure.reason),
                attempts: report.attempts,
                deals_found: 0,
                deals_excluded: 0,
                duration_ms,
            },
            Ok(extractions) => {
                let deals_found = extractions.len();
                let mut kept = Vec::with_capacity(deals_found);
                for raw in &extractions {
                    let deal = normalize(raw, rules);
                    if deal.has_any_metric() {
                        kept.push(deal);
                    } else {
                        tracing::warn!(
                            provider = %report.provider_id,
                            deal = ?deal.deal_name,
                            issues = deal.validation_issues.len(),
                            "excluding deal with no parseable metric"
                        );
                    }
                }
                let deals_excluded = deals_found - kept.len();
                let (status, reason) = if deals_excluded == 0 {
                    (ProviderStatus::Success, None)
                } else {
                    (
                        ProviderStatus::Partial,
                        Some(format!(
                            "{deals_excluded} of {deals_found} extracted deals had no parseable metric"
                        )),
                    )
                };
                self.deals.insert(report.provider_id.clone(), kept);
                ProviderOutcome {
                    provider_id: report.provider_id.clone(),
                    provider_name: report.provider_name,
                    status,
                    failure: None,
                    reason,
                    attempts: report.attempts,
                    deals_found,
                    deals_excluded,
                    duration_ms,
                }
            }
        };

        tracing::info!(
            provider = %outcome.provider_id,
            status = %outcome.status,
            attempts = outcome.attempts,
            deals_found = outcome.deals_found,
            deals_excluded = outcome.deals_excluded,
            "provider finished"
        );
        self.outcomes.insert(report.provider_id, outcome);
    }

    /// `true` once an outcome has been recorded for `provider_id`.
    #[must_use]
    pub fn has_outcome(&self, provider_id: &str) -> bool {
        self.outcomes.contains_key(provider_id)
    }

    /// Records a provider that produced no report at all.
    pub fn add_missing(&mut self, provider_id: &str, provider_name: &str, reason: &str) {
        self.outcomes.insert(
            provider_id.to_owned(),
            ProviderOutcome {
                provider_id: provider_id.to_owned(),
                provider_name: provider_name.to_owned(),
                status: ProviderStatus::Failed,
                failure: Some(FailureKind::Crashed),
                reason: Some(reason.to_owned()),
                attempts: 0,
                deals_found: 0,
                deals_excluded: 0,
                duration_ms: 0,
            },
        );
    }

    #[must_use]
    pub fn finish(self, metadata: RunMetadata) -> RunResult {
        let mut deals: Vec<NormalizedDeal> = self.deals.into_values().flatten().collect();
        sort_deals(&mut deals, &self.tie_break);
        RunResult {
            metadata,
            deals,
            outcomes: self.outcomes.into_values().collect(),
        }
    }
}

/// Sorts by monthly price ascending with unpriced deals last, then by the
/// `tie_break` keys in order. Stable, so fully equal deals keep their
/// relative order.
pub fn sort_deals(deals: &mut [NormalizedDeal], tie_break: &[TieBreak]) {
    deals.sort_by(|a, b| compare_deals(a, b, tie_break));
}

#[must_use]
pub fn compare_deals(a: &NormalizedDeal, b: &NormalizedDeal, tie_break: &[TieBreak]) -> Ordering {
    let keys = tie_break.iter().copied().chain([
        TieBreak::Provider,
        TieBreak::DealName,
        TieBreak::DownloadSpeed,
        TieBreak::ContractLength,
    ]);

    keys.fold(nulls_last(a.monthly_price, b.monthly_price), |ord, key| {
        ord.then_with(|| compare_by(key, a, b))
    })
}

fn compare_by(key: TieBreak, a: &NormalizedDeal, b: &NormalizedDeal) -> Ordering {
    match key {
        TieBreak::Provider => a
            .provider
            .to_lowercase()
            .cmp(&b.provider.to_lowercase())
            .then_with(|| a.provider_id.cmp(&b.provider_id)),
        TieBreak::DealName => nulls_last(a.deal_name.as_deref(), b.deal_name.as_deref()),
        // Faster first.
        TieBreak::DownloadSpeed => match (a.download_speed_mbps, b.download_speed_mbps) {
            (Some(a), Some(b)) => b.cmp(&a),
            (a, b) => nulls_last(a, b),
        },
        TieBreak::ContractLength => {
            nulls_last(a.contract_length_months, b.contract_length_months)
        }
    }
}

fn nulls_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
#[path = "aggregate_test.rs"]
mod tests;
