//! Provider definitions loaded from `config/providers.yaml`.
//!
//! A provider is pure data: the navigation state machine is generic and
//! reads everything site-specific (selectors, form defaults, parsing
//! hints, timeouts) from a [`ProviderConfig`]. Adding a provider means
//! adding an entry to the YAML file.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deals::{CanonicalField, TechnologyType};
use crate::ConfigError;

/// CSS selectors for the logical UI elements the state machine drives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorMap {
    pub cookie_reject: String,
    pub postcode_field: String,
    pub postcode_submit: String,
    /// Matches every selectable address entry.
    pub address_list: String,
    pub deal_container: String,
    /// Element whose presence signals the landing page finished rendering.
    #[serde(default)]
    pub page_ready: Option<String>,
    /// Element signalling the postcode lookup returned. Defaults to `address_list`.
    #[serde(default)]
    pub address_results: Option<String>,
    #[serde(default)]
    pub form_submit: Option<String>,
}

impl SelectorMap {
    /// Names of required roles that are blank.
    fn missing_required(&self) -> Vec<&'static str> {
        [
            ("cookie_reject", &self.cookie_reject),
            ("postcode_field", &self.postcode_field),
            ("postcode_submit", &self.postcode_submit),
            ("address_list", &self.address_list),
            ("deal_container", &self.deal_container),
        ]
        .into_iter()
        .filter(|(_, selector)| selector.trim().is_empty())
        .map(|(role, _)| role)
        .collect()
    }
}

/// A mandatory form field filled with a provider-declared default during
/// form completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDefault {
    /// Logical name, used for logging and as the driver's role key.
    pub name: String,
    pub selector: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutBudget {
    #[serde(default = "default_navigation_ms")]
    pub navigation_ms: u64,
    #[serde(default = "default_element_ms")]
    pub element_ms: u64,
    /// Short wait for the optional consent banner.
    #[serde(default = "default_cookie_ms")]
    pub cookie_ms: u64,
    /// Upper bound for one whole state transition.
    #[serde(default = "default_state_ms")]
    pub state_ms: u64,
}

fn default_navigation_ms() -> u64 {
    30_000
}

fn default_element_ms() -> u64 {
    10_000
}

fn default_cookie_ms() -> u64 {
    5_000
}

fn default_state_ms() -> u64 {
    60_000
}

impl Default for TimeoutBudget {
    fn default() -> Self {
        Self {
            navigation_ms: default_navigation_ms(),
            element_ms: default_element_ms(),
            cookie_ms: default_cookie_ms(),
            state_ms: default_state_ms(),
        }
    }
}

impl TimeoutBudget {
    #[must_use]
    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    #[must_use]
    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    #[must_use]
    pub fn cookie(&self) -> Duration {
        Duration::from_millis(self.cookie_ms)
    }

    #[must_use]
    pub fn state(&self) -> Duration {
        Duration::from_millis(self.state_ms)
    }
}

/// Provider-specific hints consumed by normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsingRules {
    /// Phrase → technology, matched case-insensitively as a substring before
    /// the built-in table. The longest matching phrase wins.
    #[serde(default)]
    pub technology_aliases: BTreeMap<String, TechnologyType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub selectors: SelectorMap,
    /// Canonical field → selector relative to one deal container.
    pub fields: BTreeMap<CanonicalField, String>,
    #[serde(default)]
    pub form_defaults: Vec<FormDefault>,
    #[serde(default)]
    pub parsing: ParsingRules,
    #[serde(default)]
    pub timeouts: TimeoutBudget,
    /// Overrides the global attempt limit for this provider.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Extra hosts the provider may legitimately redirect to.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

impl ProviderConfig {
    /// Host of `base_url`, e.g. `"www.sky.com"`.
    ///
    /// Falls back to the raw URL when it cannot be parsed; validated
    /// configs always parse.
    #[must_use]
    pub fn domain(&self) -> String {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_else(|| self.base_url.clone())
    }

    /// `true` if `url` stays on the provider's site or an allowed host.
    ///
    /// Subdomains of the base host (minus a leading `www.`) are accepted,
    /// so `broadband.sky.com` is on-site for `https://www.sky.com/...`.
    #[must_use]
    pub fn is_on_site(&self, url: &str) -> bool {
        let Some(host) = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };
        let base = self.domain().to_ascii_lowercase();
        let root = base.strip_prefix("www.").unwrap_or(&base);
        let matches = |allowed: &str| host == allowed || host.ends_with(&format!(".{allowed}"));
        matches(root)
            || self
                .allowed_hosts
                .iter()
                .any(|h| matches(&h.to_ascii_lowercase()))
    }

    /// Extraction map keyed by canonical field name, as handed to the driver.
    #[must_use]
    pub fn field_map(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|(field, selector)| (field.as_str().to_string(), selector.clone()))
            .collect()
    }

    /// Checks the entry is usable before any session starts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the provider and the problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "provider id must be non-empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' has an empty name",
                self.id
            )));
        }

        match url::Url::parse(&self.base_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => {}
            Ok(_) => {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' base_url {:?} must be an http(s) URL with a host",
                    self.id, self.base_url
                )))
            }
            Err(e) => {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' base_url {:?} does not parse: {e}",
                    self.id, self.base_url
                )))
            }
        }

        let missing = self.selectors.missing_required();
        if !missing.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' is missing required selector role(s): {}",
                self.id,
                missing.join(", ")
            )));
        }

        if self.fields.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' declares no extraction fields",
                self.id
            )));
        }
        if let Some((field, _)) = self.fields.iter().find(|(_, s)| s.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' has an empty selector for field '{field}'",
                self.id
            )));
        }

        for form_default in &self.form_defaults {
            if form_default.name.trim().is_empty() || form_default.selector.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' has a form default without name or selector",
                    self.id
                )));
            }
        }

        let t = &self.timeouts;
        if t.navigation_ms == 0 || t.element_ms == 0 || t.cookie_ms == 0 || t.state_ms == 0 {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' has a zero timeout",
                self.id
            )));
        }

        if self.max_retries == Some(0) {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' max_retries must be at least 1",
                self.id
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersFile {
    pub providers: Vec<ProviderConfig>,
}

impl ProvidersFile {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.id.as_str())
    }
}

/// Load and validate the provider definitions from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_providers(path: &Path) -> Result<ProvidersFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ProvidersFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_providers(&content)
}

/// Parse and validate provider definitions from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the text does not parse or fails validation.
pub fn parse_providers(content: &str) -> Result<ProvidersFile, ConfigError> {
    let providers_file: ProvidersFile = serde_yaml::from_str(content)?;
    validate_providers(&providers_file)?;
    Ok(providers_file)
}

fn validate_providers(providers_file: &ProvidersFile) -> Result<(), ConfigError> {
    if providers_file.providers.is_empty() {
        return Err(ConfigError::Invalid(
            "providers file declares no providers".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for provider in &providers_file.providers {
        provider.validate()?;
        if !seen_ids.insert(provider.id.to_lowercase()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate provider id: '{}'",
                provider.id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "providers_test.rs"]
mod tests;
