//! Scripted in-memory driver for exercising sessions without a browser.
//!
//! Each provider gets a [`Script`] describing what its pages contain and
//! which steps misbehave. Every navigation, click and fill is recorded
//! with its (tokio) timestamp so tests can assert on pacing.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bbcompare_core::ProviderConfig;
use bbcompare_scraper::{AutomationDriver, DriverFactory, RetryPolicy, ScrapeError, SelectorRole};
use tokio::time::Instant;

pub const OFF_SITE_URL: &str = "https://www.example-ads.net/landing";

/// Minimal valid provider whose fields map one-to-one onto the keys used
/// by [`deal`].
pub fn provider(id: &str, name: &str, base_url: &str) -> ProviderConfig {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": name,
        "base_url": base_url,
        "selectors": {
            "cookie_reject": "#reject-all",
            "postcode_field": "input[name='postcode']",
            "postcode_submit": "button[type='submit']",
            "address_list": "ul.addresses li",
            "deal_container": ".deal-card"
        },
        "fields": {
            "deal_name": "h3",
            "monthly_price": ".price",
            "download_speed": ".speed",
            "contract_length": ".contract"
        }
    }))
    .unwrap()
}

/// Retry policy with no jitter so paused-time tests see exact delays.
pub fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff_base: Duration::from_secs(1),
        jitter: 0.0,
        max_session: Duration::from_secs(300),
    }
}

pub fn deal(name: &str, price: &str, speed: &str, contract: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("deal_name".to_owned(), name.to_owned()),
        ("monthly_price".to_owned(), price.to_owned()),
        ("download_speed".to_owned(), speed.to_owned()),
        ("contract_length".to_owned(), contract.to_owned()),
    ])
}

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub addresses: Vec<String>,
    pub deals: Vec<BTreeMap<String, String>>,
    pub cookie_banner: bool,
    /// Times the postcode field is reported missing before it appears.
    pub postcode_field_failures: u32,
    /// Times `current_url` reports an off-site page before the real one.
    pub off_site_reads: u32,
    pub panic_on_navigate: bool,
    /// Navigation never completes.
    pub hang_on_navigate: bool,
    pub open_error: Option<ScrapeError>,
}

impl Script {
    /// A site that lists `10 Downing Street` and serves `deals`.
    pub fn serving(deals: Vec<BTreeMap<String, String>>) -> Self {
        Self {
            addresses: vec![
                "10 Downing Street, London, SW1A 2AA".to_owned(),
                "11 Downing Street, London, SW1A 2AB".to_owned(),
            ],
            deals,
            cookie_banner: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Navigate(String),
    Click(String),
    Fill(String, String),
    Close,
}

impl Action {
    /// Actions that hit the provider's servers and are paced per domain.
    pub fn is_request(&self) -> bool {
        matches!(self, Action::Navigate(_) | Action::Click(_))
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub provider: String,
    pub action: Action,
    pub at: Instant,
}

#[derive(Debug, Default)]
pub struct ScriptedFactory {
    scripts: HashMap<String, Script>,
    events: Arc<Mutex<Vec<Event>>>,
    opened: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider_id: &str, script: Script) -> Self {
        self.scripts.insert(provider_id.to_owned(), script);
        self
    }

    /// Drivers handed out so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn actions_for(&self, provider_id: &str) -> Vec<Action> {
        self.events()
            .into_iter()
            .filter(|e| e.provider == provider_id)
            .map(|e| e.action)
            .collect()
    }

    /// Builds a driver directly, bypassing the open counter.
    pub fn driver(&self, provider: &ProviderConfig) -> Box<dyn AutomationDriver> {
        Box::new(ScriptedDriver {
            provider_id: provider.id.clone(),
            script: self.scripts.get(&provider.id).cloned().unwrap_or_default(),
            postcode_failures_left: AtomicU32::new(
                self.scripts
                    .get(&provider.id)
                    .map_or(0, |s| s.postcode_field_failures),
            ),
            off_site_left: AtomicU32::new(
                self.scripts.get(&provider.id).map_or(0, |s| s.off_site_reads),
            ),
            url: String::new(),
            events: Arc::clone(&self.events),
        })
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    async fn open(
        &self,
        provider: &ProviderConfig,
    ) -> Result<Box<dyn AutomationDriver>, ScrapeError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.scripts.get(&provider.id).and_then(|s| s.open_error.clone()) {
            return Err(err);
        }
        Ok(self.driver(provider))
    }
}

struct ScriptedDriver {
    provider_id: String,
    script: Script,
    postcode_failures_left: AtomicU32,
    off_site_left: AtomicU32,
    url: String,
    events: Arc<Mutex<Vec<Event>>>,
}

impl ScriptedDriver {
    fn record(&self, action: Action) {
        self.events.lock().unwrap().push(Event {
            provider: self.provider_id.clone(),
            action,
            at: Instant::now(),
        });
    }

    fn missing(role: &SelectorRole, timeout: Duration) -> ScrapeError {
        ScrapeError::SelectorNotFound {
            role: role.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap(),
        }
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), ScrapeError> {
        self.record(Action::Navigate(url.to_owned()));
        if self.script.panic_on_navigate {
            panic!("scripted driver crashed on navigate");
        }
        if self.script.hang_on_navigate {
            std::future::pending::<()>().await;
        }
        self.url = url.to_owned();
        Ok(())
    }

    async fn wait_for(&mut self, role: &SelectorRole, timeout: Duration) -> Result<(), ScrapeError> {
        let present = match role {
            SelectorRole::CookieReject => self.script.cookie_banner,
            SelectorRole::PostcodeField => !Self::take(&self.postcode_failures_left),
            SelectorRole::AddressResults | SelectorRole::AddressList => {
                !self.script.addresses.is_empty()
            }
            SelectorRole::DealContainer => !self.script.deals.is_empty(),
            _ => true,
        };
        if present {
            Ok(())
        } else {
            Err(Self::missing(role, timeout))
        }
    }

    async fn click(&mut self, role: &SelectorRole) -> Result<(), ScrapeError> {
        self.record(Action::Click(role.to_string()));
        Ok(())
    }

    async fn fill(&mut self, role: &SelectorRole, value: &str) -> Result<(), ScrapeError> {
        self.record(Action::Fill(role.to_string(), value.to_owned()));
        Ok(())
    }

    async fn extract_all(
        &mut self,
        container: &SelectorRole,
        field_map: &BTreeMap<String, String>,
    ) -> Result<Vec<BTreeMap<String, String>>, ScrapeError> {
        let rows = match container {
            SelectorRole::AddressList => self
                .script
                .addresses
                .iter()
                .map(|address| {
                    field_map
                        .keys()
                        .map(|key| (key.clone(), address.clone()))
                        .collect()
                })
                .collect(),
            SelectorRole::DealContainer => self
                .script
                .deals
                .iter()
                .map(|row| {
                    row.iter()
                        .filter(|(key, _)| field_map.contains_key(*key))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(rows)
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        if Self::take(&self.off_site_left) {
            return Ok(OFF_SITE_URL.to_owned());
        }
        Ok(self.url.clone())
    }

    async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
        self.record(Action::Close);
        Ok(())
    }
}

/// Asserts that request-issuing actions against each domain are spaced
/// by at least `interval`.
pub fn assert_paced(events: &[Event], domain_of: impl Fn(&str) -> String, interval: Duration) {
    let mut by_domain: BTreeMap<String, Vec<Instant>> = BTreeMap::new();
    for event in events.iter().filter(|e| e.action.is_request()) {
        by_domain
            .entry(domain_of(&event.provider))
            .or_default()
            .push(event.at);
    }
    for (domain, mut stamps) in by_domain {
        stamps.sort();
        for pair in stamps.windows(2) {
            assert!(
                pair[1] - pair[0] >= interval,
                "requests to {domain} only {:?} apart",
                pair[1] - pair[0]
            );
        }
    }
}
