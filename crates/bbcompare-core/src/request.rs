use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::CoreError;

static POSTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{1,2}[0-9][A-Z0-9]? ?[0-9][A-Z]{2}$").expect("static postcode regex")
});

/// Canonicalizes a UK postcode to upper case with a single space before
/// the inward code (`"sw1a1aa"` → `"SW1A 1AA"`).
///
/// # Errors
///
/// Returns [`CoreError::InvalidPostcode`] if the input is not a UK postcode.
pub fn normalize_postcode(raw: &str) -> Result<String, CoreError> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    if compact.len() < 5 || !POSTCODE_RE.is_match(&compact) {
        return Err(CoreError::InvalidPostcode(raw.to_string()));
    }
    let (outward, inward) = compact.split_at(compact.len() - 3);
    Ok(format!("{outward} {inward}"))
}

/// Immutable input to one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub postcode: String,
    /// Address entry to pick; the first listed address is used when absent.
    pub address: Option<String>,
    /// Provider ids to run; every configured provider when absent.
    pub providers: Option<Vec<String>>,
}

impl ScrapeRequest {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPostcode`] if `postcode` does not validate.
    pub fn new(
        postcode: &str,
        address: Option<String>,
        providers: Option<Vec<String>>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            postcode: normalize_postcode(postcode)?,
            address: address.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
            providers: providers.filter(|p| !p.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_spacing_and_case() {
        assert_eq!(normalize_postcode("sw1a1aa").unwrap(), "SW1A 1AA");
        assert_eq!(normalize_postcode("  SW1A   1AA ").unwrap(), "SW1A 1AA");
        assert_eq!(normalize_postcode("m1 1ae").unwrap(), "M1 1AE");
        assert_eq!(normalize_postcode("EC1A1BB").unwrap(), "EC1A 1BB");
        assert_eq!(normalize_postcode("B33 8TH").unwrap(), "B33 8TH");
    }

    #[test]
    fn rejects_malformed_postcodes() {
        for bad in ["", "12345", "SW1A", "SW1A 1A", "ZZZZ 1AA", "SW1A-1AA", "1AA SW1"] {
            assert!(normalize_postcode(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn request_drops_blank_address_and_empty_provider_list() {
        let req = ScrapeRequest::new("SW1A 1AA", Some("   ".to_string()), Some(vec![])).unwrap();
        assert!(req.address.is_none());
        assert!(req.providers.is_none());
    }

    #[test]
    fn request_rejects_invalid_postcode() {
        let err = ScrapeRequest::new("nope", None, None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPostcode(ref p) if p == "nope"));
    }
}
