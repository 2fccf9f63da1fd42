//! Chromium-backed driver using chromiumoxide.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bbcompare_core::ProviderConfig;
use bbcompare_scraper::{AutomationDriver, DriverFactory, ScrapeError, SelectorRole};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::script;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to build browser config: {0}")]
    Config(String),

    #[error("failed to launch Chromium: {0}")]
    Launch(String),
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Explicit Chromium binary; auto-detected when `None`.
    pub chrome_path: Option<PathBuf>,
    pub window_size: (u32, u32),
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_size: (1366, 900),
        }
    }
}

/// One Chromium process shared by every session of a run. Each
/// [`DriverFactory::open`] creates a fresh page.
pub struct ChromiumDriverFactory {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumDriverFactory {
    /// Launches Chromium and spawns its CDP event loop on tokio.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError`] if the config is rejected or the process
    /// cannot be started.
    pub async fn launch(options: &BrowserOptions) -> Result<Self, BrowserError> {
        let (width, height) = options.window_size;
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Config)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser handler error");
                }
            }
        });

        tracing::info!(headless = options.headless, "chromium launched");
        Ok(Self { browser, handler })
    }

    /// Closes the browser process and stops the event loop.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!(error = %e, "failed to close chromium");
        }
        self.handler.abort();
    }
}

#[async_trait]
impl DriverFactory for ChromiumDriverFactory {
    async fn open(
        &self,
        provider: &ProviderConfig,
    ) -> Result<Box<dyn AutomationDriver>, ScrapeError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Driver(format!("failed to open page: {e}")))?;
        Ok(Box::new(ChromiumDriver {
            page,
            provider: Arc::new(provider.clone()),
        }))
    }
}

/// One page bound to one provider. Roles are resolved through the
/// provider's selector map.
pub struct ChromiumDriver {
    page: Page,
    provider: Arc<ProviderConfig>,
}

impl ChromiumDriver {
    fn selector(&self, role: &SelectorRole) -> Result<String, ScrapeError> {
        role.resolve(&self.provider)
            .map(str::to_owned)
            .ok_or_else(|| {
                ScrapeError::ConfigInvalid(format!(
                    "provider '{}' declares no selector for {role}",
                    self.provider.id
                ))
            })
    }

    async fn eval<T: DeserializeOwned>(&self, js: String) -> Result<T, ScrapeError> {
        self.page
            .evaluate(js)
            .await
            .map_err(|e| ScrapeError::Driver(format!("script evaluation failed: {e}")))?
            .into_value()
            .map_err(|e| ScrapeError::Driver(format!("unexpected script result: {e}")))
    }

    fn not_found(role: &SelectorRole, timeout: Duration) -> ScrapeError {
        ScrapeError::SelectorNotFound {
            role: role.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[async_trait]
impl AutomationDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ScrapeError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                tracing::debug!(provider = %self.provider.id, url, "navigated");
                Ok(())
            }
            Ok(Err(e)) => Err(ScrapeError::Driver(format!("navigation to {url} failed: {e}"))),
            Err(_) => Err(ScrapeError::NavigationTimeout {
                url: url.to_owned(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn wait_for(&mut self, role: &SelectorRole, timeout: Duration) -> Result<(), ScrapeError> {
        let selector = self.selector(role)?;
        let deadline = Instant::now() + timeout;
        loop {
            let found: u64 = self.eval(script::count(&selector)).await?;
            if found > 0 {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Self::not_found(role, timeout));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn click(&mut self, role: &SelectorRole) -> Result<(), ScrapeError> {
        let selector = self.selector(role)?;
        let index = match role {
            SelectorRole::AddressOption(i) => *i,
            _ => 0,
        };
        let clicked: bool = self.eval(script::click(&selector, index)).await?;
        if clicked {
            Ok(())
        } else {
            Err(Self::not_found(role, Duration::ZERO))
        }
    }

    async fn fill(&mut self, role: &SelectorRole, value: &str) -> Result<(), ScrapeError> {
        let selector = self.selector(role)?;
        let how: String = self.eval(script::fill(&selector, value)).await?;
        if how == script::FILL_MISSING {
            return Err(Self::not_found(role, Duration::ZERO));
        }
        tracing::trace!(provider = %self.provider.id, %role, how = %how, "filled");
        Ok(())
    }

    async fn extract_all(
        &mut self,
        container: &SelectorRole,
        field_map: &BTreeMap<String, String>,
    ) -> Result<Vec<BTreeMap<String, String>>, ScrapeError> {
        let selector = self.selector(container)?;
        self.eval(script::extract_all(&selector, field_map)).await
    }

    async fn current_url(&self) -> Result<String, ScrapeError> {
        self.page
            .url()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| ScrapeError::Driver(format!("failed to read page url: {e}")))
    }

    async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
        self.page
            .close()
            .await
            .map_err(|e| ScrapeError::Driver(format!("failed to close page: {e}")))
    }
}
