use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical deal fields a provider can declare an extraction rule for.
///
/// The serialized name doubles as the key in [`RawExtraction::fields`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    DealName,
    MonthlyPrice,
    PromotionalPrice,
    UpfrontCost,
    ContractLength,
    TotalContractCost,
    DownloadSpeed,
    UploadSpeed,
    Technology,
    DataAllowance,
    RouterIncluded,
    PhoneIncluded,
    TvIncluded,
    AvailabilityDate,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 14] = [
        CanonicalField::DealName,
        CanonicalField::MonthlyPrice,
        CanonicalField::PromotionalPrice,
        CanonicalField::UpfrontCost,
        CanonicalField::ContractLength,
        CanonicalField::TotalContractCost,
        CanonicalField::DownloadSpeed,
        CanonicalField::UploadSpeed,
        CanonicalField::Technology,
        CanonicalField::DataAllowance,
        CanonicalField::RouterIncluded,
        CanonicalField::PhoneIncluded,
        CanonicalField::TvIncluded,
        CanonicalField::AvailabilityDate,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::DealName => "deal_name",
            CanonicalField::MonthlyPrice => "monthly_price",
            CanonicalField::PromotionalPrice => "promotional_price",
            CanonicalField::UpfrontCost => "upfront_cost",
            CanonicalField::ContractLength => "contract_length",
            CanonicalField::TotalContractCost => "total_contract_cost",
            CanonicalField::DownloadSpeed => "download_speed",
            CanonicalField::UploadSpeed => "upload_speed",
            CanonicalField::Technology => "technology",
            CanonicalField::DataAllowance => "data_allowance",
            CanonicalField::RouterIncluded => "router_included",
            CanonicalField::PhoneIncluded => "phone_included",
            CanonicalField::TvIncluded => "tv_included",
            CanonicalField::AvailabilityDate => "availability_date",
        }
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadband access technology. Unmapped provider wording lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TechnologyType {
    #[serde(rename = "FTTC", alias = "fttc")]
    Fttc,
    #[serde(rename = "FTTP", alias = "fttp")]
    Fttp,
    #[serde(rename = "Cable", alias = "cable")]
    Cable,
    #[serde(rename = "ADSL", alias = "adsl")]
    Adsl,
    #[serde(rename = "Other", alias = "other")]
    Other,
}

impl std::fmt::Display for TechnologyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TechnologyType::Fttc => write!(f, "FTTC"),
            TechnologyType::Fttp => write!(f, "FTTP"),
            TechnologyType::Cable => write!(f, "Cable"),
            TechnologyType::Adsl => write!(f, "ADSL"),
            TechnologyType::Other => write!(f, "Other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataAllowance {
    Unlimited,
    Capped { gb: Decimal },
}

impl std::fmt::Display for DataAllowance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataAllowance::Unlimited => write!(f, "Unlimited"),
            DataAllowance::Capped { gb } => write!(f, "{gb}GB"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The provider page did not yield a value for the field.
    Missing,
    /// A value was present but could not be parsed.
    Unparseable,
    /// A value parsed but does not map to a canonical variant.
    UnmappedValue,
    /// A value parsed but falls outside the plausible range.
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: CanonicalField,
    pub kind: IssueKind,
    /// Raw text that triggered the issue, when there was any.
    pub raw: Option<String>,
}

/// Raw field text pulled from one deal container on a provider page.
///
/// Produced once per container when a session reaches its extraction
/// state and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExtraction {
    pub provider_id: String,
    pub provider_name: String,
    pub postcode: String,
    /// Label of the address entry the session selected.
    pub address: Option<String>,
    /// Canonical field name → raw element text.
    pub fields: BTreeMap<String, String>,
    pub source_url: String,
    pub extracted_at: DateTime<Utc>,
}

impl RawExtraction {
    /// Returns the trimmed raw text for `field`, treating blank text as absent.
    #[must_use]
    pub fn field(&self, field: CanonicalField) -> Option<&str> {
        self.fields
            .get(field.as_str())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealMetadata {
    pub extracted_at: DateTime<Utc>,
    pub postcode: String,
    pub address: Option<String>,
    pub source_url: String,
}

/// A broadband deal in the canonical comparison schema.
///
/// Prices are GBP with two decimal places; speeds are Mbps. Every numeric
/// field is non-negative. Fields the provider page did not yield are `None`
/// and carry a matching entry in `validation_issues`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedDeal {
    pub provider_id: String,
    pub provider: String,
    pub deal_name: Option<String>,
    pub monthly_price: Option<Decimal>,
    pub promotional_price: Option<Decimal>,
    pub upfront_cost: Option<Decimal>,
    pub contract_length_months: Option<u32>,
    pub total_contract_cost: Option<Decimal>,
    pub download_speed_mbps: Option<Decimal>,
    pub upload_speed_mbps: Option<Decimal>,
    pub technology: TechnologyType,
    pub data_allowance: Option<DataAllowance>,
    pub router_included: Option<bool>,
    pub phone_included: Option<bool>,
    pub tv_included: Option<bool>,
    pub availability_date: Option<NaiveDate>,
    pub metadata: DealMetadata,
    pub validation_issues: Vec<ValidationIssue>,
}

impl NormalizedDeal {
    /// `true` when at least one comparison metric carries a value.
    ///
    /// The deal name alone is not a metric, and neither is a technology
    /// that fell back to `Other`.
    #[must_use]
    pub fn has_any_metric(&self) -> bool {
        self.monthly_price.is_some()
            || self.promotional_price.is_some()
            || self.upfront_cost.is_some()
            || self.contract_length_months.is_some()
            || self.total_contract_cost.is_some()
            || self.download_speed_mbps.is_some()
            || self.upload_speed_mbps.is_some()
            || self.technology != TechnologyType::Other
            || self.data_allowance.is_some()
            || self.router_included.is_some()
            || self.phone_included.is_some()
            || self.tv_included.is_some()
            || self.availability_date.is_some()
    }

    /// Returns the issues recorded against `field`.
    pub fn issues_for(&self, field: CanonicalField) -> impl Iterator<Item = &ValidationIssue> {
        self.validation_issues
            .iter()
            .filter(move |issue| issue.field == field)
    }
}
