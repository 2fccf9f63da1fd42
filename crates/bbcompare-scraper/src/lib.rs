pub mod aggregate;
pub mod driver;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod parse;
pub mod rate_limit;
pub mod retry;
pub mod session;
pub mod state_machine;

pub use aggregate::{compare_deals, sort_deals, ResultAggregator};
pub use driver::{AutomationDriver, DriverFactory, SelectorRole, SCOPE_SELECTOR};
pub use error::ScrapeError;
pub use normalize::normalize;
pub use orchestrator::{OrchestratorSettings, SessionOrchestrator};
pub use rate_limit::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};
pub use session::{CookieOutcome, SessionContext, SessionFailure, SessionReport, SessionState};
pub use state_machine::ProviderStateMachine;
