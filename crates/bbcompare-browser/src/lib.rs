//! Chromium implementation of the scraper's automation driver.

pub mod chromium;
pub mod script;

pub use chromium::{BrowserError, BrowserOptions, ChromiumDriver, ChromiumDriverFactory};
