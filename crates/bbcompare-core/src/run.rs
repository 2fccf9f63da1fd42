use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deals::NormalizedDeal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Session succeeded and every extracted deal survived normalization.
    Success,
    /// Session succeeded but some extracted deals were excluded.
    Partial,
    Failed,
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderStatus::Success => write!(f, "success"),
            ProviderStatus::Partial => write!(f, "partial"),
            ProviderStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a provider session ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NavigationTimeout,
    SelectorNotFound,
    /// The provider lists no address for the postcode. Not a scrape fault.
    NoAvailability,
    AddressNotFound,
    ExtractionEmpty,
    UnexpectedNavigation,
    /// The run deadline expired before the session finished.
    Timeout,
    Driver,
    /// The provider entry lacks a selector the session needed.
    ConfigInvalid,
    /// The session task panicked.
    Crashed,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::NavigationTimeout => "NavigationTimeout",
            FailureKind::SelectorNotFound => "SelectorNotFound",
            FailureKind::NoAvailability => "NoAvailability",
            FailureKind::AddressNotFound => "AddressNotFound",
            FailureKind::ExtractionEmpty => "ExtractionEmpty",
            FailureKind::UnexpectedNavigation => "UnexpectedNavigation",
            FailureKind::Timeout => "Timeout",
            FailureKind::Driver => "Driver",
            FailureKind::ConfigInvalid => "ConfigInvalid",
            FailureKind::Crashed => "Crashed",
        };
        f.write_str(s)
    }
}

/// Per-provider record of how its session went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOutcome {
    pub provider_id: String,
    pub provider_name: String,
    pub status: ProviderStatus,
    pub failure: Option<FailureKind>,
    /// Human-readable explanation for `partial` and `failed`.
    pub reason: Option<String>,
    pub attempts: u32,
    /// Raw deal containers extracted.
    pub deals_found: usize,
    /// Extracted deals dropped because no metric could be parsed.
    pub deals_excluded: usize,
    pub duration_ms: u64,
}

impl ProviderOutcome {
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self.status, ProviderStatus::Success | ProviderStatus::Partial)
    }
}

/// Secondary sort keys applied after monthly price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    Provider,
    DealName,
    DownloadSpeed,
    ContractLength,
}

impl std::str::FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider" => Ok(TieBreak::Provider),
            "deal_name" => Ok(TieBreak::DealName),
            "download_speed" => Ok(TieBreak::DownloadSpeed),
            "contract_length" => Ok(TieBreak::ContractLength),
            other => Err(format!(
                "unknown tie-break key {other:?}; expected provider, deal_name, download_speed or contract_length"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub postcode: String,
    pub address: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Final artifact of one orchestration run, handed to the exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub metadata: RunMetadata,
    /// Sorted by monthly price, then the configured tie-break keys.
    pub deals: Vec<NormalizedDeal>,
    /// One entry per provider that was scheduled, ordered by provider id.
    pub outcomes: Vec<ProviderOutcome>,
}

impl RunResult {
    /// `true` if at least one provider produced a usable session.
    #[must_use]
    pub fn has_success(&self) -> bool {
        self.outcomes.iter().any(ProviderOutcome::is_usable)
    }

    #[must_use]
    pub fn outcome(&self, provider_id: &str) -> Option<&ProviderOutcome> {
        self.outcomes.iter().find(|o| o.provider_id == provider_id)
    }

    pub fn deals_for<'a>(
        &'a self,
        provider_id: &'a str,
    ) -> impl Iterator<Item = &'a NormalizedDeal> + 'a {
        self.deals.iter().filter(move |d| d.provider_id == provider_id)
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_deals(&self.deals)
    }
}

/// Headline statistics over a set of deals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_deals: usize,
    /// Provider display name → deal count.
    pub deals_per_provider: BTreeMap<String, usize>,
    pub lowest_monthly_price: Option<Decimal>,
    pub highest_monthly_price: Option<Decimal>,
    /// Rounded to two decimal places.
    pub average_monthly_price: Option<Decimal>,
    pub slowest_download_mbps: Option<Decimal>,
    pub fastest_download_mbps: Option<Decimal>,
    /// Rounded to two decimal places.
    pub average_download_mbps: Option<Decimal>,
}

impl RunSummary {
    #[must_use]
    pub fn from_deals(deals: &[NormalizedDeal]) -> Self {
        let mut deals_per_provider = BTreeMap::new();
        for deal in deals {
            *deals_per_provider.entry(deal.provider.clone()).or_insert(0) += 1;
        }

        let prices: Vec<Decimal> = deals.iter().filter_map(|d| d.monthly_price).collect();
        let speeds: Vec<Decimal> = deals.iter().filter_map(|d| d.download_speed_mbps).collect();


        Self {
            total_deals: deals.len(),
            deals_per_provider,
            lowest_monthly_price: prices.iter().min().copied(),
            highest_monthly_price: prices.iter().max().copied(),
            average_monthly_price: mean(&prices),
            slowest_download_mbps: speeds.iter().min().copied(),
            fastest_download_mbps: speeds.iter().max().copied(),
            average_download_mbps: mean(&speeds),
        }
    }
}

fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let total: Decimal = values.iter().sum();
    Some((total / Decimal::from(values.len())).round_dp(2))
}
