pub mod app_config;
pub mod config;
pub mod deals;
pub mod providers;
pub mod request;
pub mod run;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use deals::{
    CanonicalField, DataAllowance, DealMetadata, IssueKind, NormalizedDeal, RawExtraction,
    TechnologyType, ValidationIssue,
};
pub use providers::{
    load_providers, parse_providers, FormDefault, ParsingRules, ProviderConfig, ProvidersFile,
    SelectorMap, TimeoutBudget,
};
pub use request::{normalize_postcode, ScrapeRequest};
pub use run::{
    FailureKind, ProviderOutcome, ProviderStatus, RunMetadata, RunResult, RunSummary, TieBreak,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read providers file {path}: {source}")]
    ProvidersFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse providers file: {0}")]
    ProvidersFileParse(#[from] serde_yaml::Error),

    /// A provider entry is unusable. Startup-fatal: no session may start.
    #[error("invalid provider configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid UK postcode: {0:?}")]
    InvalidPostcode(String),
}
