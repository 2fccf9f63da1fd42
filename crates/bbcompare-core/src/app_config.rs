use std::path::PathBuf;

use crate::run::TieBreak;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl Environment {
    /// `true` where log output is collected rather than read in a terminal,
    /// so lines carry no ANSI colour codes.
    #[must_use]
    pub fn plain_logs(&self) -> bool {
        matches!(self, Environment::Test | Environment::Production)
    }
}

/// Process-wide settings resolved from the environment at startup.
///
/// Provider definitions are not part of this struct; they are loaded
/// separately from `providers_path` by [`crate::load_providers`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub providers_path: PathBuf,
    pub output_dir: PathBuf,
    /// Worker pool size. `None` means one worker per selected provider.
    pub max_concurrent_sessions: Option<usize>,
    /// Upper bound applied to the pool size regardless of provider count.
    pub concurrency_ceiling: usize,
    pub min_request_interval_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub max_session_secs: u64,
    pub run_deadline_secs: u64,
    pub tie_break: Vec<TieBreak>,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
}
