pub mod models {
    pub mod tado;
}

pub mod client;
pub mod config;
pub mod interrupt;
pub mod logging;
pub mod token;
pub mod services {
    pub mod auth;
    #[cfg(test)]
    pub mod fake;
    pub mod monitor;
    pub mod presence;
    pub mod zones;
}

use crate::config::Config;
use crate::interrupt::Interrupt;
use crate::services::{auth, monitor};
use crate::token::TokenStore;
use log::info;
use std::path::{Path, PathBuf};

pub fn run(cfg: &Config) -> Result<(), String> {
    info!(
        "Config loaded (checking_interval={}s, error_retry_interval={}s, min_temp={}, max_temp={}, enable_temp_limit={}, token_folder={})",
        cfg.checking_interval.as_secs_f64(),
        cfg.error_retry_interval.as_secs_f64(),
        cfg.min_temp,
        cfg.max_temp,
        cfg.enable_temp_limit,
        cfg.token_folder.display()
    );

    let interrupt = Interrupt::new();
    interrupt.install_signal_handler()?;

    let store = TokenStore::new(&cfg.token_folder)
        .map_err(|e| format!("creating token folder {} failed: {}", cfg.token_folder.display(), e))?;

    // Both stages return on interrupt only; exit code 0 is the contract for
    // a user-requested stop.
    let Some(client) = auth::authenticate(cfg, &store, &interrupt) else {
        return Ok(());
    };
    monitor::run_loop(&client, cfg, &interrupt);
    Ok(())
}

fn configure_env_from_cli() -> Result<Option<PathBuf>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            Some(s) if s.starts_with("--env-file=") => {
                env_file = Some(PathBuf::from(&s["--env-file=".len()..]));
            }
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    match env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            load_env_file(&path)?;
            Ok(Some(path))
        }
        None => {
            let default_path = PathBuf::from(".env");
            if default_path.is_file() {
                load_env_file(&default_path)?;
                Ok(Some(default_path))
            } else {
                Ok(None)
            }
        }
    }
}

fn load_env_file(path: &Path) -> Result<(), String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

    for (index, line) in content.lines().enumerate() {
        match parse_env_line(line) {
            Ok(Some((key, value))) => {
                // Values already supplied via the process environment win.
                if std::env::var_os(&key).is_none() {
                    // Updating process-level environment variables is unsafe
                    // on some targets.
                    unsafe {
                        std::env::set_var(key, value);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => return Err(format!("{}:{}: {}", path.display(), index + 1, e)),
        }
    }
    Ok(())
}

/// Parse one `KEY=VALUE` line. Blank lines and `#` comments yield `None`;
/// an optional `export ` prefix and simple surrounding quotes are stripped.
fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let assignment = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);
    let (key, raw_value) = assignment
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() || key.chars().any(|c| c.is_whitespace()) {
        return Err(format!("invalid environment variable name: {:?}", key));
    }

    let value = raw_value.trim();
    let value = if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
        || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
    {
        &value[1..value.len() - 1]
    } else {
        value
    };
    Ok(Some((key.to_string(), value.to_string())))
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    if let Err(err) = logging::init(&cfg) {
        eprintln!("fatal: {}", err);
        std::process::exit(1);
    }

    if let Some(path) = loaded_env.as_ref() {
        info!("Environment loaded from .env file: {}", path.display());
    }

    info!(
        "tado-autoassist {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );

    if let Err(e) = run(&cfg) {
        log::error!("fatal: {}", e);
        std::process::exit(1);
    }
}
