use std::path::PathBuf;

use crate::app_config::{AppConfig, Environment};
use crate::run::TieBreak;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let env = parse_environment(&or_default("BBCOMPARE_ENV", "development"))?;
    let log_level = or_default("BBCOMPARE_LOG_LEVEL", "info");
    let providers_path = PathBuf::from(or_default(
        "BBCOMPARE_PROVIDERS_PATH",
        "./config/providers.yaml",
    ));
    let output_dir = PathBuf::from(or_default("BBCOMPARE_OUTPUT_DIR", "./output"));

    let max_concurrent_sessions = match lookup("BBCOMPARE_MAX_CONCURRENT_SESSIONS") {
        Ok(raw) => {
            let n = raw
                .parse::<usize>()
                .map_err(|e| invalid("BBCOMPARE_MAX_CONCURRENT_SESSIONS", e.to_string()))?;
            if n == 0 {
                return Err(invalid(
                    "BBCOMPARE_MAX_CONCURRENT_SESSIONS",
                    "must be at least 1".to_string(),
                ));
            }
            Some(n)
        }
        Err(_) => None,
    };
    let concurrency_ceiling = parse_usize("BBCOMPARE_CONCURRENCY_CEILING", "6")?;
    if concurrency_ceiling == 0 {
        return Err(invalid(
            "BBCOMPARE_CONCURRENCY_CEILING",
            "must be at least 1".to_string(),
        ));
    }

    let min_request_interval_ms = parse_u64("BBCOMPARE_MIN_REQUEST_INTERVAL_MS", "2500")?;
    let max_retries = parse_u32("BBCOMPARE_MAX_RETRIES", "3")?;
    let retry_backoff_base_ms = parse_u64("BBCOMPARE_RETRY_BACKOFF_BASE_MS", "1000")?;
    let max_session_secs = parse_u64("BBCOMPARE_MAX_SESSION_SECS", "300")?;
    let run_deadline_secs = parse_u64("BBCOMPARE_RUN_DEADLINE_SECS", "600")?;
    let tie_break = parse_tie_break(&or_default("BBCOMPARE_TIE_BREAK", "provider,deal_name"))?;
    let headless = parse_bool("BBCOMPARE_HEADLESS", &or_default("BBCOMPARE_HEADLESS", "true"))?;
    let chrome_path = lookup("BBCOMPARE_CHROME_PATH").ok().map(PathBuf::from);

    Ok(AppConfig {
        env,
        log_level,
        providers_path,
        output_dir,
        max_concurrent_sessions,
        concurrency_ceiling,
        min_request_interval_ms,
        max_retries,
        retry_backoff_base_ms,
        max_session_secs,
        run_deadline_secs,
        tie_break,
        headless,
        chrome_path,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "BBCOMPARE_ENV".to_string(),
            reason: format!("unknown environment {other:?}"),
        }),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_tie_break(raw: &str) -> Result<Vec<TieBreak>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|key| {
            key.parse::<TieBreak>()
                .map_err(|reason| ConfigError::InvalidEnvVar {
                    var: "BBCOMPARE_TIE_BREAK".to_string(),
                    reason,
                })
        })
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
