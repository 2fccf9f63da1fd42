//! Normalization from a [`RawExtraction`] to a [`NormalizedDeal`].
//!
//! Text parsing is delegated to [`crate::parse`]; this module decides what
//! each outcome means. A field that is absent or does not parse becomes
//! `None` plus a [`ValidationIssue`]; nothing is dropped here. Whether a
//! deal is kept at all is decided by the aggregator through
//! [`NormalizedDeal::has_any_metric`].

use bbcompare_core::{
    CanonicalField, DealMetadata, IssueKind, NormalizedDeal, ParsingRules, RawExtraction,
    TechnologyType, ValidationIssue,
};
use rust_decimal::Decimal;

use crate::parse::{
    clean_text, parse_availability_date, parse_contract_months, parse_data_allowance,
    parse_included, parse_price, parse_speed_mbps, parse_technology,
};

const MAX_MONTHLY_PRICE: Decimal = Decimal::from_parts(200, 0, 0, false, 0);
const MIN_SPEED_MBPS: Decimal = Decimal::ONE;
const MAX_SPEED_MBPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
const MAX_CONTRACT_MONTHS: u32 = 60;

/// Normalizes one raw deal. Pure: the same input always yields the same
/// output, byte for byte.
#[must_use]
pub fn normalize(raw: &RawExtraction, rules: &ParsingRules) -> NormalizedDeal {
    let mut issues = Issues::default();
    let extracted_on = raw.extracted_at.date_naive();

    let deal_name = issues.require(raw, CanonicalField::DealName, |s| {
        let name = clean_text(s);
        (!name.is_empty()).then_some(name)
    });

    let monthly_price = issues.require(raw, CanonicalField::MonthlyPrice, parse_price);
    if let Some(price) = monthly_price {
        issues.check_range(
            CanonicalField::MonthlyPrice,
            price > Decimal::ZERO && price <= MAX_MONTHLY_PRICE,
            raw,
        );
    }

    let promotional_price = issues.require(raw, CanonicalField::PromotionalPrice, parse_price);
    let upfront_cost = issues.require(raw, CanonicalField::UpfrontCost, parse_price);

    let contract_length_months =
        issues.require(raw, CanonicalField::ContractLength, parse_contract_months);
    if let Some(months) = contract_length_months {
        issues.check_range(
            CanonicalField::ContractLength,
            (1..=MAX_CONTRACT_MONTHS).contains(&months),
            raw,
        );
    }

    // Computed from the other costs when the page does not state it.
    let total_contract_cost = match raw.field(CanonicalField::TotalContractCost) {
        Some(_) => issues.require(raw, CanonicalField::TotalContractCost, parse_price),
        None => match (monthly_price, contract_length_months) {
            (Some(monthly), Some(months)) => {
                Some(upfront_cost.unwrap_or(Decimal::ZERO) + monthly * Decimal::from(months))
            }
            _ => issues.require(raw, CanonicalField::TotalContractCost, parse_price),
        },
    };

    let download_speed_mbps = issues.require(raw, CanonicalField::DownloadSpeed, parse_speed_mbps);
    if let Some(speed) = download_speed_mbps {
        issues.check_range(
            CanonicalField::DownloadSpeed,
            speed >= MIN_SPEED_MBPS && speed <= MAX_SPEED_MBPS,
            raw,
        );
    }
    let upload_speed_mbps = issues.require(raw, CanonicalField::UploadSpeed, parse_speed_mbps);
    if let Some(speed) = upload_speed_mbps {
        issues.check_range(
            CanonicalField::UploadSpeed,
            speed > Decimal::ZERO && speed <= MAX_SPEED_MBPS,
            raw,
        );
    }

    let technology = match raw.field(CanonicalField::Technology) {
        None => {
            issues.push(CanonicalField::Technology, IssueKind::Missing, None);
            TechnologyType::Other
        }
        Some(text) => parse_technology(text, rules).unwrap_or_else(|| {
            issues.push(
                CanonicalField::Technology,
                IssueKind::UnmappedValue,
                Some(text),
            );
            TechnologyType::Other
        }),
    };

    let data_allowance = issues.require(raw, CanonicalField::DataAllowance, parse_data_allowance);
    let router_included = issues.require(raw, CanonicalField::RouterIncluded, parse_included);
    let phone_included = issues.require(raw, CanonicalField::PhoneIncluded, parse_included);
    let tv_included = issues.require(raw, CanonicalField::TvIncluded, parse_included);
    let availability_date = issues.require(raw, CanonicalField::AvailabilityDate, |s| {
        parse_availability_date(s, extracted_on)
    });

    NormalizedDeal {
        provider_id: raw.provider_id.clone(),
        provider: raw.provider_name.clone(),
        deal_name,
        monthly_price,
        promotional_price,
        upfront_cost,
        contract_length_months,
        total_contract_cost,
        download_speed_mbps,
        upload_speed_mbps,
        technology,
        data_allowance,
        router_included,
        phone_included,
        tv_included,
        availability_date,
        metadata: DealMetadata {
            extracted_at: raw.extracted_at,
            postcode: raw.postcode.clone(),
            address: raw.address.clone(),
            source_url: raw.source_url.clone(),
        },
        validation_issues: issues.0,
    }
}

#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, field: CanonicalField, kind: IssueKind, raw: Option<&str>) {
        self.0.push(ValidationIssue {
            field,
            kind,
            raw: raw.map(str::to_owned),
        });
    }

    /// Parses `field` with `parse`, recording `Missing` or `Unparseable`
    /// when no value comes out.
    fn require<T>(
        &mut self,
        raw: &RawExtraction,
        field: CanonicalField,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let Some(text) = raw.field(field) else {
            self.push(field, IssueKind::Missing, None);
            return None;
        };
        let value = parse(text);
        if value.is_none() {
            self.push(field, IssueKind::Unparseable, Some(text));
        }
        value
    }

    /// Flags a parsed value outside its plausible range. The value is kept.
    fn check_range(&mut self, field: CanonicalField, in_range: bool, raw: &RawExtraction) {
        if !in_range {
            self.push(field, IssueKind::OutOfRange, raw.field(field));
        }
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
