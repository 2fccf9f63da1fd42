use std::collections::HashMap;
use std::env::VarError;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

#[test]
fn parse_environment_development() {
    assert_eq!(
        parse_environment("development").unwrap(),
        Environment::Development
    );
}

#[test]
fn parse_environment_production() {
    assert_eq!(
        parse_environment("production").unwrap(),
        Environment::Production
    );
}

#[test]
fn only_development_logs_in_colour() {
    assert!(!Environment::Development.plain_logs());
    assert!(Environment::Test.plain_logs());
    assert!(Environment::Production.plain_logs());
}

#[test]
fn parse_environment_unknown_fails() {
    let err = parse_environment("staging").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "BBCOMPARE_ENV"));
}

#[test]
fn build_app_config_defaults_with_empty_env() {
    let map: HashMap<&str, &str> = HashMap::new();
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.env, Environment::Development);
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.providers_path, PathBuf::from("./config/providers.yaml"));
    assert_eq!(cfg.output_dir, PathBuf::from("./output"));
    assert_eq!(cfg.max_concurrent_sessions, None);
    assert_eq!(cfg.concurrency_ceiling, 6);
    assert_eq!(cfg.min_request_interval_ms, 2500);
    assert_eq!(cfg.max_retries, 3);
    assert_eq!(cfg.retry_backoff_base_ms, 1000);
    assert_eq!(cfg.max_session_secs, 300);
    assert_eq!(cfg.run_deadline_secs, 600);
    assert_eq!(cfg.tie_break, vec![TieBreak::Provider, TieBreak::DealName]);
    assert!(cfg.headless);
    assert!(cfg.chrome_path.is_none());
}

#[test]
fn max_concurrent_sessions_override() {
    let mut map = HashMap::new();
    map.insert("BBCOMPARE_MAX_CONCURRENT_SESSIONS", "2");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.max_concurrent_sessions, Some(2));
}

#[test]
fn max_concurrent_sessions_zero_is_rejected() {
    let mut map = HashMap::new();
    map.insert("BBCOMPARE_MAX_CONCURRENT_SESSIONS", "0");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "BBCOMPARE_MAX_CONCURRENT_SESSIONS"),
        "expected InvalidEnvVar(BBCOMPARE_MAX_CONCURRENT_SESSIONS), got: {result:?}"
    );
}

#[test]
fn min_request_interval_invalid() {
    let mut map = HashMap::new();
    map.insert("BBCOMPARE_MIN_REQUEST_INTERVAL_MS", "soon");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "BBCOMPARE_MIN_REQUEST_INTERVAL_MS"),
        "expected InvalidEnvVar(BBCOMPARE_MIN_REQUEST_INTERVAL_MS), got: {result:?}"
    );
}

#[test]
fn max_retries_override() {
    let mut map = HashMap::new();
    map.insert("BBCOMPARE_MAX_RETRIES", "5");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.max_retries, 5);
}

#[test]
fn tie_break_override() {
    let mut map = HashMap::new();
    map.insert("BBCOMPARE_TIE_BREAK", "download_speed, provider");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(
        cfg.tie_break,
        vec![TieBreak::DownloadSpeed, TieBreak::Provider]
    );
}

#[test]
fn tie_break_unknown_key_is_rejected() {
    let mut map = HashMap::new();
    map.insert("BBCOMPARE_TIE_BREAK", "provider,colour");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "BBCOMPARE_TIE_BREAK"),
        "expected InvalidEnvVar(BBCOMPARE_TIE_BREAK), got: {result:?}"
    );
}

#[test]
fn headless_accepts_false() {
    let mut map = HashMap::new();
    map.insert("BBCOMPARE_HEADLESS", "false");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert!(!cfg.headless);
}

#[test]
fn headless_rejects_garbage() {
    let mut map = HashMap::new();
    map.insert("BBCOMPARE_HEADLESS", "maybe");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "BBCOMPARE_HEADLESS"),
        "expected InvalidEnvVar(BBCOMPARE_HEADLESS), got: {result:?}"
    );
}

#[test]
fn chrome_path_is_read_when_set() {
    let mut map = HashMap::new();
    map.insert("BBCOMPARE_CHROME_PATH", "/usr/bin/chromium");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.chrome_path, Some(PathBuf::from("/usr/bin/chromium")));
}
