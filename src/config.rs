//! Runtime configuration, sourced from environment variables with defaults.
//! Unparseable values fall back to their default rather than aborting.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CHECKING_INTERVAL_SECS: f64 = 10.0;
pub const DEFAULT_ERROR_RETRY_INTERVAL_SECS: f64 = 30.0;
pub const DEFAULT_MIN_TEMP_C: i32 = 5;
pub const DEFAULT_MAX_TEMP_C: i32 = 20;
pub const DEFAULT_TOKEN_FOLDER: &str = "./token";
pub const DEFAULT_LOG_FILE: &str = "logfile.log";
pub const DEFAULT_MAX_LOG_LINES: usize = 50;

#[derive(Debug, Clone)]
pub struct Config {
    /// Happy-path spacing between monitoring cycles.
    pub checking_interval: Duration,
    /// Backoff spacing after any failure, including failed activation polls.
    pub error_retry_interval: Duration,
    /// Zone clamp bounds, integer Celsius.
    pub min_temp: i32,
    pub max_temp: i32,
    /// Gates all temperature clamp logic.
    pub enable_temp_limit: bool,
    /// Directory holding the persisted refresh token; created if absent.
    pub token_folder: PathBuf,
    /// Mirror log output into `log_file` when set.
    pub save_log: bool,
    pub log_file: PathBuf,
    /// On startup, an existing log file is trimmed to its last N lines.
    pub max_log_lines: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let min_temp = parse_or(get("MIN_TEMP"), DEFAULT_MIN_TEMP_C);
        let max_temp = parse_or(get("MAX_TEMP"), DEFAULT_MAX_TEMP_C);
        if min_temp > max_temp {
            return Err(format!(
                "MIN_TEMP ({}) must not exceed MAX_TEMP ({})",
                min_temp, max_temp
            ));
        }

        Ok(Config {
            checking_interval: interval_or(get("CHECKING_INTERVAL"), DEFAULT_CHECKING_INTERVAL_SECS),
            error_retry_interval: interval_or(get("ERROR_RETRY_INTERVAL"), DEFAULT_ERROR_RETRY_INTERVAL_SECS),
            min_temp,
            max_temp,
            enable_temp_limit: bool_or(get("ENABLE_TEMP_LIMIT"), true),
            token_folder: PathBuf::from(get("TOKEN_FOLDER").unwrap_or_else(|| DEFAULT_TOKEN_FOLDER.to_string())),
            save_log: bool_or(get("SAVE_LOG"), false),
            log_file: PathBuf::from(get("LOG_FILE").unwrap_or_else(|| DEFAULT_LOG_FILE.to_string())),
            max_log_lines: parse_or(get("MAX_LOG_LINES"), DEFAULT_MAX_LOG_LINES),
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.trim().parse::<T>().ok()).unwrap_or(default)
}

fn bool_or(value: Option<String>, default: bool) -> bool {
    match value {
        Some(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        None => default,
    }
}

/// Seconds-as-float interval; non-finite or negative values fall back.
fn interval_or(value: Option<String>, default_secs: f64) -> Duration {
    let secs = value
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(default_secs);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = Config::from_lookup(env(&[])).expect("defaults valid");
        assert_eq!(cfg.checking_interval, Duration::from_secs_f64(10.0));
        assert_eq!(cfg.error_retry_interval, Duration::from_secs_f64(30.0));
        assert_eq!(cfg.min_temp, 5);
        assert_eq!(cfg.max_temp, 20);
        assert!(cfg.enable_temp_limit);
        assert!(!cfg.save_log);
        assert_eq!(cfg.token_folder, PathBuf::from("./token"));
        assert_eq!(cfg.max_log_lines, 50);
    }

    #[test]
    fn values_override_defaults() {
        let cfg = Config::from_lookup(env(&[
            ("CHECKING_INTERVAL", "2.5"),
            ("MIN_TEMP", "8"),
            ("MAX_TEMP", "22"),
            ("ENABLE_TEMP_LIMIT", "no"),
            ("SAVE_LOG", "YES"),
        ]))
        .expect("valid");
        assert_eq!(cfg.checking_interval, Duration::from_secs_f64(2.5));
        assert_eq!(cfg.min_temp, 8);
        assert_eq!(cfg.max_temp, 22);
        assert!(!cfg.enable_temp_limit);
        assert!(cfg.save_log);
    }

    #[test]
    fn garbage_values_fall_back_to_defaults() {
        let cfg = Config::from_lookup(env(&[
            ("CHECKING_INTERVAL", "soon"),
            ("ERROR_RETRY_INTERVAL", "-4"),
            ("MAX_LOG_LINES", "many"),
        ]))
        .expect("valid");
        assert_eq!(cfg.checking_interval, Duration::from_secs_f64(10.0));
        assert_eq!(cfg.error_retry_interval, Duration::from_secs_f64(30.0));
        assert_eq!(cfg.max_log_lines, 50);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = Config::from_lookup(env(&[("MIN_TEMP", "25"), ("MAX_TEMP", "20")]))
            .expect_err("inverted bounds");
        assert!(err.contains("MIN_TEMP"));
    }

    #[test]
    fn bool_parsing_accepts_the_documented_spellings() {
        assert!(bool_or(Some("true".into()), false));
        assert!(bool_or(Some("1".into()), false));
        assert!(bool_or(Some(" Yes ".into()), false));
        assert!(!bool_or(Some("off".into()), true));
        assert!(bool_or(None, true));
    }
}
