use std::collections::BTreeMap;
use std::str::FromStr;

use bbcompare_core::DataAllowance;
use chrono::{DateTime, NaiveDate, Utc};

use super::*;

fn raw(fields: &[(&str, &str)]) -> RawExtraction {
    RawExtraction {
        provider_id: "sky".to_owned(),
        provider_name: "Sky".to_owned(),
        postcode: "SW1A 1AA".to_owned(),
        address: Some("10 Downing Street, London".to_owned()),
        fields: fields
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<BTreeMap<_, _>>(),
        source_url: "https://www.sky.com/broadband/deals".to_owned(),
        extracted_at: DateTime::parse_from_rfc3339("2026-01-05T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc),
    }
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn full_raw() -> RawExtraction {
    raw(&[
        ("deal_name", "  Full Fibre   500 "),
        ("monthly_price", "£35.00 a month"),
        ("upfront_cost", "£20"),
        ("contract_length", "24 months"),
        ("download_speed", "Average 500Mbps"),
        ("upload_speed", "up to 75Mb"),
        ("technology", "Full Fibre 500"),
        ("data_allowance", "Unlimited"),
        ("router_included", "Sky Broadband Hub included"),
        ("phone_included", "No phone line"),
        ("tv_included", "No"),
        ("availability_date", "Available now"),
        ("promotional_price", "£30"),
    ])
}

fn kinds_for(deal: &NormalizedDeal, field: CanonicalField) -> Vec<IssueKind> {
    deal.issues_for(field).map(|i| i.kind).collect()
}

#[test]
fn full_extraction_normalizes_every_field() {
    let deal = normalize(&full_raw(), &ParsingRules::default());

    assert_eq!(deal.provider_id, "sky");
    assert_eq!(deal.provider, "Sky");
    assert_eq!(deal.deal_name.as_deref(), Some("Full Fibre 500"));
    assert_eq!(deal.monthly_price, Some(dec("35.00")));
    assert_eq!(deal.promotional_price, Some(dec("30")));
    assert_eq!(deal.upfront_cost, Some(dec("20")));
    assert_eq!(deal.contract_length_months, Some(24));
    assert_eq!(deal.download_speed_mbps, Some(dec("500")));
    assert_eq!(deal.upload_speed_mbps, Some(dec("75")));
    assert_eq!(deal.technology, TechnologyType::Fttp);
    assert_eq!(deal.data_allowance, Some(DataAllowance::Unlimited));
    assert_eq!(deal.router_included, Some(true));
    assert_eq!(deal.phone_included, Some(false));
    assert_eq!(deal.tv_included, Some(false));
    assert_eq!(deal.availability_date, NaiveDate::from_ymd_opt(2026, 1, 5));
    assert_eq!(deal.metadata.postcode, "SW1A 1AA");
    assert_eq!(
        deal.metadata.address.as_deref(),
        Some("10 Downing Street, London")
    );
    assert!(deal.validation_issues.is_empty(), "{:?}", deal.validation_issues);
}

#[test]
fn total_contract_cost_is_computed_when_absent() {
    let deal = normalize(&full_raw(), &ParsingRules::default());
    // £20 upfront + £35 × 24
    assert_eq!(deal.total_contract_cost, Some(dec("860")));
    assert!(kinds_for(&deal, CanonicalField::TotalContractCost).is_empty());
}

#[test]
fn stated_total_contract_cost_wins() {
    let mut input = full_raw();
    input
        .fields
        .insert("total_contract_cost".to_owned(), "£900.00 total".to_owned());
    let deal = normalize(&input, &ParsingRules::default());
    assert_eq!(deal.total_contract_cost, Some(dec("900")));
}

#[test]
fn missing_fields_are_null_and_flagged() {
    let deal = normalize(
        &raw(&[("deal_name", "Essential"), ("monthly_price", "£22")]),
        &ParsingRules::default(),
    );
    assert_eq!(deal.monthly_price, Some(dec("22")));
    assert_eq!(deal.download_speed_mbps, None);
    assert_eq!(
        kinds_for(&deal, CanonicalField::DownloadSpeed),
        vec![IssueKind::Missing]
    );
    assert_eq!(
        kinds_for(&deal, CanonicalField::Technology),
        vec![IssueKind::Missing]
    );
    assert_eq!(
        kinds_for(&deal, CanonicalField::TotalContractCost),
        vec![IssueKind::Missing]
    );
    assert_eq!(deal.technology, TechnologyType::Other);
}

#[test]
fn unparseable_values_keep_raw_text() {
    let deal = normalize(
        &raw(&[("monthly_price", "Call us"), ("download_speed", "Very fast")]),
        &ParsingRules::default(),
    );
    assert_eq!(deal.monthly_price, None);
    let issue = deal
        .issues_for(CanonicalField::MonthlyPrice)
        .next()
        .unwrap();
    assert_eq!(issue.kind, IssueKind::Unparseable);
    assert_eq!(issue.raw.as_deref(), Some("Call us"));
    assert_eq!(
        kinds_for(&deal, CanonicalField::DownloadSpeed),
        vec![IssueKind::Unparseable]
    );
}

#[test]
fn unmapped_technology_falls_back_to_other() {
    let deal = normalize(
        &raw(&[("technology", "Broadband Essentials")]),
        &ParsingRules::default(),
    );
    assert_eq!(deal.technology, TechnologyType::Other);
    assert_eq!(
        kinds_for(&deal, CanonicalField::Technology),
        vec![IssueKind::UnmappedValue]
    );
}

#[test]
fn provider_aliases_drive_technology() {
    let mut technology_aliases = BTreeMap::new();
    technology_aliases.insert("essential".to_owned(), TechnologyType::Adsl);
    let rules = ParsingRules { technology_aliases };
    let deal = normalize(&raw(&[("technology", "Broadband Essentials")]), &rules);
    assert_eq!(deal.technology, TechnologyType::Adsl);
}

#[test]
fn implausible_values_are_kept_but_flagged() {
    let deal = normalize(
        &raw(&[("monthly_price", "£250"), ("download_speed", "20Gbps")]),
        &ParsingRules::default(),
    );
    assert_eq!(deal.monthly_price, Some(dec("250")));
    assert_eq!(deal.download_speed_mbps, Some(dec("20000")));
    assert_eq!(
        kinds_for(&deal, CanonicalField::MonthlyPrice),
        vec![IssueKind::OutOfRange]
    );
    assert_eq!(
        kinds_for(&deal, CanonicalField::DownloadSpeed),
        vec![IssueKind::OutOfRange]
    );
}

#[test]
fn all_null_deal_has_no_metric() {
    let deal = normalize(
        &raw(&[("deal_name", "Mystery deal"), ("monthly_price", "TBC")]),
        &ParsingRules::default(),
    );
    assert!(!deal.has_any_metric());
}

#[test]
fn normalization_is_deterministic() {
    let input = full_raw();
    let rules = ParsingRules::default();
    let first = normalize(&input, &rules);
    let second = normalize(&input, &rules);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
