//! Parsers from raw provider page text to typed deal values.
//!
//! Each parser returns `None` when the text carries no recognizable value;
//! [`crate::normalize`] turns that into a validation issue.

use std::str::FromStr;
use std::sync::LazyLock;

use bbcompare_core::{DataAllowance, ParsingRules, TechnologyType};
use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid number regex"));

static PENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*p$").expect("valid pence regex"));

static SPEED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d[\d,]*(?:\.\d+)?)\s*(gbps|gb/s|gb|gig|mbps|mb/s|mb|kbps|kb/s|kb)?")
        .expect("valid speed regex")
});

static CONTRACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*-?\s*(months?|mths?|mo\b|years?|yrs?)?").expect("valid contract regex")
});

static DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d[\d,]*(?:\.\d+)?)\s*(tb|gb|mb)\b").expect("valid data allowance regex")
});

static DAY_MONTH_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})(?:st|nd|rd|th)?\s+([a-z]+)\s+(\d{4})").expect("valid date regex")
});

static NUMERIC_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4}").expect("valid numeric date regex")
});

/// Built-in technology wording, checked after provider aliases. Order
/// matters: full-fibre phrases must win over a bare "fibre".
const TECHNOLOGY_KEYWORDS: &[(&str, TechnologyType)] = &[
    ("full fibre", TechnologyType::Fttp),
    ("fttp", TechnologyType::Fttp),
    ("fibre to the premises", TechnologyType::Fttp),
    ("fibre to the home", TechnologyType::Fttp),
    ("ftth", TechnologyType::Fttp),
    ("gigabit", TechnologyType::Fttp),
    ("cable", TechnologyType::Cable),
    ("docsis", TechnologyType::Cable),
    ("fttc", TechnologyType::Fttc),
    ("fibre to the cabinet", TechnologyType::Fttc),
    ("superfast", TechnologyType::Fttc),
    ("fibre", TechnologyType::Fttc),
    ("adsl", TechnologyType::Adsl),
    ("copper", TechnologyType::Adsl),
    ("standard broadband", TechnologyType::Adsl),
];

/// Parses a GBP amount: `"£29.99 a month"` → 29.99, `"£1,200"` → 1200,
/// `"50p"` → 0.50, `"Free"` → 0. Rounded to two decimal places.
#[must_use]
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let lower = raw.trim().to_lowercase();
    let compact: String = lower.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(caps) = PENCE_RE.captures(&compact) {
        let pence = Decimal::from_str(&caps[1]).ok()?;
        return Some(to_pounds(pence / Decimal::ONE_HUNDRED));
    }

    match NUMBER_RE.find(&lower) {
        Some(m) => grouped_decimal(m.as_str()).map(to_pounds),
        None if lower.contains("free") || lower.contains("no upfront") => {
            Some(to_pounds(Decimal::ZERO))
        }
        None => None,
    }
}

/// Fixes an amount at two decimal places.
fn to_pounds(amount: Decimal) -> Decimal {
    let mut amount = amount.round_dp(2);
    amount.rescale(2);
    amount
}

/// Reads a number that may carry thousands separators, e.g. `1,130`.
fn grouped_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(&text.replace(',', "")).ok()
}

/// Parses a line speed into Mbps: `"up to 500Mbps"` → 500,
/// `"1.6Gbps"` → 1600, `"512kbps"` → 0.512.
#[must_use]
pub fn parse_speed_mbps(raw: &str) -> Option<Decimal> {
    let lower = raw.trim().to_lowercase();
    let caps = SPEED_RE.captures(&lower)?;
    let value = grouped_decimal(&caps[1])?;
    let thousand = Decimal::from(1000);

    let mbps = match caps.get(2).map(|m| m.as_str()) {
        Some("gbps" | "gb/s" | "gb" | "gig") => value * thousand,
        Some("kbps" | "kb/s" | "kb") => value / thousand,
        Some(_) => value,
        None if lower.contains("gig") => value * thousand,
        None => value,
    };
    Some(mbps.normalize())
}

/// Parses a contract term into months: `"18 months"` → 18,
/// `"2 years"` → 24, `"Rolling monthly"` / `"No contract"` → 1.
#[must_use]
pub fn parse_contract_months(raw: &str) -> Option<u32> {
    let lower = raw.trim().to_lowercase();
    if lower.contains("rolling") || lower.contains("no contract") || lower.contains("30 day") {
        return Some(1);
    }

    let caps = CONTRACT_RE.captures(&lower)?;
    let count: u32 = caps[1].parse().ok()?;
    let is_years = caps
        .get(2)
        .is_some_and(|m| m.as_str().starts_with('y'));
    if is_years {
        count.checked_mul(12)
    } else {
        Some(count)
    }
}

/// Maps provider wording to a technology. Provider aliases are tried
/// first as case-insensitive substrings; the longest matching alias wins.
#[must_use]
pub fn parse_technology(raw: &str, rules: &ParsingRules) -> Option<TechnologyType> {
    let lower = raw.trim().to_lowercase();
    rules
        .technology_aliases
        .iter()
        .filter(|(alias, _)| lower.contains(&alias.to_lowercase()))
        .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
        .map(|(_, tech)| *tech)
        .or_else(|| {
            TECHNOLOGY_KEYWORDS
                .iter()
                .find(|(keyword, _)| lower.contains(keyword))
                .map(|(_, tech)| *tech)
        })
}

/// Parses a data allowance: anything mentioning "unlimited" is
/// [`DataAllowance::Unlimited`], otherwise a capped amount in GB.
#[must_use]
pub fn parse_data_allowance(raw: &str) -> Option<DataAllowance> {
    let lower = raw.trim().to_lowercase();
    if lower.contains("unlimited") {
        return Some(DataAllowance::Unlimited);
    }
    let caps = DATA_RE.captures(&lower)?;
    let value = grouped_decimal(&caps[1])?;
    let gb = match &caps[2] {
        "tb" => value * Decimal::from(1000),
        "mb" => value / Decimal::from(1000),
        _ => value,
    };
    Some(DataAllowance::Capped { gb: gb.normalize() })
}

/// Parses an inclusion flag such as "Router included" or "No TV".
/// Negative wording is checked first so "not included" reads as `false`.
#[must_use]
pub fn parse_included(raw: &str) -> Option<bool> {
    let lower = raw.trim().to_lowercase();
    let first_word = lower
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())
        .unwrap_or("");

    let negative = matches!(first_word, "no" | "none" | "false" | "n")
        || ["not included", "not available", "without", "excluded", "✗", "✘"]
            .iter()
            .any(|p| lower.contains(p));
    if negative {
        return Some(false);
    }

    let positive = matches!(first_word, "yes" | "true" | "y" | "with")
        || ["included", "includes", "inc.", "free", "✓", "✔"]
            .iter()
            .any(|p| lower.contains(p));
    positive.then_some(true)
}

/// Parses an availability date. Immediate wording ("now", "today") maps to
/// `extracted_on`; otherwise ISO `2026-03-01`, UK `01/03/2026`, or
/// `1st March 2026` are accepted anywhere in the text.
#[must_use]
pub fn parse_availability_date(raw: &str, extracted_on: NaiveDate) -> Option<NaiveDate> {
    let lower = raw.trim().to_lowercase();
    let immediate = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| matches!(w, "now" | "today" | "immediately" | "immediate"));
    if immediate {
        return Some(extracted_on);
    }

    if let Some(m) = NUMERIC_DATE_RE.find(&lower) {
        let text = m.as_str();
        return NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(text, "%d/%m/%Y"))
            .ok();
    }

    let caps = DAY_MONTH_YEAR_RE.captures(&lower)?;
    let text = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
    NaiveDate::parse_from_str(&text, "%d %B %Y")
        .or_else(|_| NaiveDate::parse_from_str(&text, "%d %b %Y"))
        .ok()
}

/// Collapses internal whitespace runs to single spaces.
#[must_use]
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
