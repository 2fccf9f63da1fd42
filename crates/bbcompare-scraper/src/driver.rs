//! Browser automation seam.
//!
//! The state machine never sees CSS. It asks the driver for logical
//! [`SelectorRole`]s and the driver resolves them against the
//! [`ProviderConfig`] it was opened for.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bbcompare_core::ProviderConfig;

use crate::error::ScrapeError;

/// Field-map key that makes `extract_all` return a container's own text.
pub const SCOPE_SELECTOR: &str = ":scope";

/// Logical UI element named by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SelectorRole {
    CookieReject,
    PageReady,
    PostcodeField,
    PostcodeSubmit,
    AddressResults,
    AddressList,
    /// The `n`th element matched by [`SelectorRole::AddressList`].
    AddressOption(usize),
    /// A provider-declared form default, by name.
    FormField(String),
    FormSubmit,
    DealContainer,
}

impl SelectorRole {
    /// CSS selector for this role under `provider`, or `None` when the
    /// provider does not declare the role.
    ///
    /// `AddressOption` resolves to the address list selector; picking the
    /// index is left to the driver.
    #[must_use]
    pub fn resolve<'a>(&self, provider: &'a ProviderConfig) -> Option<&'a str> {
        let selectors = &provider.selectors;
        let selector = match self {
            SelectorRole::CookieReject => Some(selectors.cookie_reject.as_str()),
            SelectorRole::PageReady => selectors.page_ready.as_deref(),
            SelectorRole::PostcodeField => Some(selectors.postcode_field.as_str()),
            SelectorRole::PostcodeSubmit => Some(selectors.postcode_submit.as_str()),
            SelectorRole::AddressResults => Some(
                selectors
                    .address_results
                    .as_deref()
                    .unwrap_or(selectors.address_list.as_str()),
            ),
            SelectorRole::AddressList | SelectorRole::AddressOption(_) => {
                Some(selectors.address_list.as_str())
            }
            SelectorRole::FormField(name) => provider
                .form_defaults
                .iter()
                .find(|d| &d.name == name)
                .map(|d| d.selector.as_str()),
            SelectorRole::FormSubmit => selectors.form_submit.as_deref(),
            SelectorRole::DealContainer => Some(selectors.deal_container.as_str()),
        };
        selector.filter(|s| !s.trim().is_empty())
    }
}

impl std::fmt::Display for SelectorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectorRole::CookieReject => f.write_str("cookie_reject"),
            SelectorRole::PageReady => f.write_str("page_ready"),
            SelectorRole::PostcodeField => f.write_str("postcode_field"),
            SelectorRole::PostcodeSubmit => f.write_str("postcode_submit"),
            SelectorRole::AddressResults => f.write_str("address_results"),
            SelectorRole::AddressList => f.write_str("address_list"),
            SelectorRole::AddressOption(i) => write!(f, "address_option[{i}]"),
            SelectorRole::FormField(name) => write!(f, "form_field[{name}]"),
            SelectorRole::FormSubmit => f.write_str("form_submit"),
            SelectorRole::DealContainer => f.write_str("deal_container"),
        }
    }
}

/// One browser page driven by a single provider session.
///
/// Every operation fails with a classified [`ScrapeError`]; drivers map
/// their own failures onto `NavigationTimeout`, `SelectorNotFound` or
/// `Driver`.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// Waits until `role` matches at least one element.
    async fn wait_for(&mut self, role: &SelectorRole, timeout: Duration)
        -> Result<(), ScrapeError>;

    async fn click(&mut self, role: &SelectorRole) -> Result<(), ScrapeError>;

    /// Puts `value` into the element. Inputs are typed into, selects are
    /// set, anything else is clicked.
    async fn fill(&mut self, role: &SelectorRole, value: &str) -> Result<(), ScrapeError>;

    /// Returns one map per element matching `container`, keyed like
    /// `field_map` with the trimmed text of the first match of each field
    /// selector inside that element. Fields with no match are omitted.
    async fn extract_all(
        &mut self,
        container: &SelectorRole,
        field_map: &BTreeMap<String, String>,
    ) -> Result<Vec<BTreeMap<String, String>>, ScrapeError>;

    async fn current_url(&self) -> Result<String, ScrapeError>;

    async fn close(self: Box<Self>) -> Result<(), ScrapeError>;
}

/// Opens a fresh driver for each provider session.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(
        &self,
        provider: &ProviderConfig,
    ) -> Result<Box<dyn AutomationDriver>, ScrapeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbcompare_core::parse_providers;

    const YAML: &str = r##"
providers:
  - id: ee
    name: EE
    base_url: https://ee.co.uk/broadband
    selectors:
      cookie_reject: "#reject"
      postcode_field: "input[name='postcode']"
      postcode_submit: "button.submit"
      address_list: "select option"
      deal_container: ".deal"
    form_defaults:
      - name: contract_term
        selector: "button.term-24"
        value: "24"
    fields:
      monthly_price: ".price"
"##;

    fn provider() -> ProviderConfig {
        parse_providers(YAML).unwrap().providers.remove(0)
    }

    #[test]
    fn hash_selectors_survive_yaml_loading() {
        assert_eq!(SelectorRole::CookieReject.resolve(&provider()), Some("#reject"));
    }

    #[test]
    fn address_results_falls_back_to_address_list() {
        let p = provider();
        assert_eq!(SelectorRole::AddressResults.resolve(&p), Some("select option"));
        assert_eq!(SelectorRole::AddressOption(3).resolve(&p), Some("select option"));
    }

    #[test]
    fn optional_roles_resolve_to_none_when_undeclared() {
        let p = provider();
        assert_eq!(SelectorRole::PageReady.resolve(&p), None);
        assert_eq!(SelectorRole::FormSubmit.resolve(&p), None);
    }

    #[test]
    fn form_fields_resolve_by_name() {
        let p = provider();
        assert_eq!(
            SelectorRole::FormField("contract_term".to_owned()).resolve(&p),
            Some("button.term-24")
        );
        assert_eq!(SelectorRole::FormField("other".to_owned()).resolve(&p), None);
    }

    #[test]
    fn display_names_match_config_keys() {
        assert_eq!(SelectorRole::PostcodeField.to_string(), "postcode_field");
        assert_eq!(SelectorRole::AddressOption(2).to_string(), "address_option[2]");
    }
}
