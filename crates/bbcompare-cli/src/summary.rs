//! Human-readable run report printed to stdout.

use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

use bbcompare_core::{ProviderStatus, RunResult};
use rust_decimal::Decimal;

fn pounds(value: Decimal) -> String {
    format!("£{:.2}", value.round_dp(2))
}

pub(crate) fn render(result: &RunResult, written: &[PathBuf]) -> String {
    let mut out = String::new();
    let meta = &result.metadata;
    let _ = writeln!(out, "Broadband comparison for {}", meta.postcode);
    if let Some(address) = &meta.address {
        let _ = writeln!(out, "Address: {address}");
    }
    let _ = writeln!(out, "Run {}", meta.run_id);

    out.push_str("\nProviders:\n");
    for outcome in &result.outcomes {
        let mut line = format!(
            "  {:<16} {:<8} {} deal(s), {} attempt(s), {:.1}s",
            outcome.provider_name,
            outcome.status.to_string(),
            outcome.deals_found.saturating_sub(outcome.deals_excluded),
            outcome.attempts,
            Duration::from_millis(outcome.duration_ms).as_secs_f64(),
        );
        if outcome.status != ProviderStatus::Success {
            if let Some(failure) = outcome.failure {
                let _ = write!(line, " [{failure}]");
            }
            if let Some(reason) = &outcome.reason {
                let _ = write!(line, " {reason}");
            }
        }
        out.push_str(&line);
        out.push('\n');
    }

    let summary = result.summary();
    let _ = writeln!(out, "\nTotal deals: {}", summary.total_deals);
    if let (Some(low), Some(high)) = (summary.lowest_monthly_price, summary.highest_monthly_price)
    {
        let _ = writeln!(out, "Monthly price: {} - {}", pounds(low), pounds(high));
    }
    if let Some(avg) = summary.average_monthly_price {
        let _ = writeln!(out, "Average monthly price: {}", pounds(avg));
    }
    if let (Some(slow), Some(fast)) = (summary.slowest_download_mbps, summary.fastest_download_mbps)
    {
        let _ = writeln!(out, "Download speed: {slow} - {fast} Mbps");
    }
    if let Some(avg) = summary.average_download_mbps {
        let _ = writeln!(out, "Average download speed: {avg:.0} Mbps");
    }
    if let Some(cheapest) = result.deals.first().filter(|d| d.monthly_price.is_some()) {
        let _ = writeln!(
            out,
            "Cheapest: {} {} at {}/month",
            cheapest.provider,
            cheapest.deal_name.as_deref().unwrap_or("(unnamed)"),
            cheapest.monthly_price.map(pounds).unwrap_or_default(),
        );
    }

    if !written.is_empty() {
        out.push_str("\nWritten:\n");
        for path in written {
            let _ = writeln!(out, "  {}", path.display());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbcompare_core::{
        DealMetadata, FailureKind, NormalizedDeal, ProviderOutcome, RunMetadata, TechnologyType,
    };
    use chrono::Utc;

    fn deal(provider: &str, price: i64, speed: i64) -> NormalizedDeal {
        NormalizedDeal {
            provider_id: provider.to_lowercase(),
            provider: provider.to_string(),
            deal_name: Some(format!("{provider} Fibre")),
            monthly_price: Some(Decimal::new(price, 2)),
            promotional_price: None,
            upfront_cost: None,
            contract_length_months: None,
            total_contract_cost: None,
            download_speed_mbps: Some(Decimal::from(speed)),
            upload_speed_mbps: None,
            technology: TechnologyType::Fttp,
            data_allowance: None,
            router_included: None,
            phone_included: None,
            tv_included: None,
            availability_date: None,
            metadata: DealMetadata {
                extracted_at: Utc::now(),
                postcode: "SW1A 1AA".to_string(),
                address: None,
                source_url: "https://example.com".to_string(),
            },
            validation_issues: vec![],
        }
    }

    fn outcome(name: &str, status: ProviderStatus, failure: Option<FailureKind>) -> ProviderOutcome {
        ProviderOutcome {
            provider_id: name.to_lowercase(),
            provider_name: name.to_string(),
            status,
            failure,
            reason: failure.map(|_| "no addresses listed for postcode".to_string()),
            attempts: 1,
            deals_found: 0,
            deals_excluded: 0,
            duration_ms: 1500,
        }
    }

    fn result(deals: Vec<NormalizedDeal>, outcomes: Vec<ProviderOutcome>) -> RunResult {
        let now = Utc::now();
        RunResult {
            metadata: RunMetadata {
                run_id: uuid::Uuid::nil(),
                postcode: "SW1A 1AA".to_string(),
                address: Some("10 Downing Street".to_string()),
                started_at: now,
                finished_at: now,
            },
            deals,
            outcomes,
        }
    }

    #[test]
    fn renders_price_range_and_cheapest() {
        let mut bt = outcome("BT", ProviderStatus::Success, None);
        bt.deals_found = 2;
        let report = render(
            &result(
                vec![deal("BT", 2200, 500), deal("BT", 3550, 900)],
                vec![bt],
            ),
            &[PathBuf::from("out/broadband_comparison_20260302_091630.csv")],
        );
        assert!(report.contains("Broadband comparison for SW1A 1AA"));
        assert!(report.contains("Address: 10 Downing Street"));
        assert!(report.contains("Total deals: 2"));
        assert!(report.contains("Monthly price: £22.00 - £35.50"));
        assert!(report.contains("Average monthly price: £28.75"));
        assert!(report.contains("Download speed: 500 - 900 Mbps"));
        assert!(report.contains("Average download speed: 700 Mbps"));
        assert!(report.contains("Cheapest: BT BT Fibre at £22.00/month"));
        assert!(report.contains("broadband_comparison_20260302_091630.csv"));
    }

    #[test]
    fn failed_providers_show_their_failure() {
        let report = render(
            &result(
                vec![],
                vec![outcome(
                    "Sky",
                    ProviderStatus::Failed,
                    Some(FailureKind::NoAvailability),
                )],
            ),
            &[],
        );
        assert!(report.contains("failed"));
        assert!(report.contains("[NoAvailability] no addresses listed for postcode"));
        assert!(report.contains("Total deals: 0"));
        assert!(!report.contains("Monthly price"));
        assert!(!report.contains("Written:"));
    }
}
