//! Configuration loading and resolution.
//!
//! Every setting resolves as: command-line flag, then `ROSTER_WATCH_*`
//! environment variable, then built-in default.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_DATA_FILE: &str = "faction_data.json";
const DEFAULT_USERNAME: &str = "Faction Tracker";
const DEFAULT_INTERVAL_SECS: u64 = 3;
const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 500;
const DEFAULT_CHALLENGE_WAIT_MS: u64 = 10_000;
const DEFAULT_ALERT_AFTER: u32 = 10;

/// Command-line overrides shared by the watch commands.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct WatchArgs {
    /// Roster page URL.
    #[arg(long)]
    pub url: Option<String>,

    /// Discord-compatible webhook URL.
    #[arg(long)]
    pub webhook: Option<String>,

    /// Display name used for webhook posts.
    #[arg(long)]
    pub username: Option<String>,

    /// User id (or full mention tag) pinged on each towed vehicle.
    #[arg(long)]
    pub mention: Option<String>,

    /// Path of the baseline JSON file.
    #[arg(long)]
    pub data_file: Option<PathBuf>,

    /// Seconds between watch cycles.
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Per-request timeout in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Fetch attempts per cycle before giving up.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Disable the headless browser fallback.
    #[arg(long)]
    pub no_browser: bool,
}

/// How the roster source fetches pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub browser_fallback: bool,
    pub challenge_wait: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_MS),
            browser_fallback: true,
            challenge_wait: Duration::from_millis(DEFAULT_CHALLENGE_WAIT_MS),
        }
    }
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub roster_url: String,
    pub webhook_url: String,
    pub webhook_username: String,
    pub mention: Option<String>,
    pub data_file: PathBuf,
    pub poll_interval: Duration,
    pub failure_alert_after: u32,
    pub fetch: FetchConfig,
}

impl Config {
    /// Resolve from flags and the process environment.
    pub fn resolve(args: &WatchArgs) -> Result<Self, ConfigError> {
        Self::resolve_with(args, |name| std::env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with<F>(args: &WatchArgs, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let roster_url = args
            .url
            .clone()
            .or_else(|| lookup("ROSTER_WATCH_URL"))
            .ok_or(ConfigError::Missing {
                flag: "--url",
                env: "ROSTER_WATCH_URL",
            })?;
        validate_url("url", &roster_url)?;

        let webhook_url = args
            .webhook
            .clone()
            .or_else(|| lookup("ROSTER_WATCH_WEBHOOK"))
            .ok_or(ConfigError::Missing {
                flag: "--webhook",
                env: "ROSTER_WATCH_WEBHOOK",
            })?;
        validate_url("webhook", &webhook_url)?;

        let webhook_username = args
            .username
            .clone()
            .or_else(|| lookup("ROSTER_WATCH_USERNAME"))
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());

        let mention = args
            .mention
            .clone()
            .or_else(|| lookup("ROSTER_WATCH_MENTION"))
            .and_then(|m| normalize_mention(&m));

        let data_file = resolve_data_file_with(args.data_file.as_deref(), &lookup);

        let interval_secs = match args.interval_secs {
            Some(v) => v,
            None => parse_env("ROSTER_WATCH_INTERVAL_SECS", &lookup, DEFAULT_INTERVAL_SECS)?,
        };
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }

        let timeout_ms = match args.timeout_ms {
            Some(v) => v,
            None => parse_env("ROSTER_WATCH_TIMEOUT_MS", &lookup, DEFAULT_TIMEOUT_MS)?,
        };
        let max_attempts = match args.max_attempts {
            Some(v) => v,
            None => parse_env("ROSTER_WATCH_MAX_ATTEMPTS", &lookup, DEFAULT_MAX_ATTEMPTS)?,
        };
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }

        let backoff_ms = parse_env("ROSTER_WATCH_BACKOFF_MS", &lookup, DEFAULT_BACKOFF_MS)?;
        let challenge_wait_ms = parse_env(
            "ROSTER_WATCH_CHALLENGE_WAIT_MS",
            &lookup,
            DEFAULT_CHALLENGE_WAIT_MS,
        )?;
        let failure_alert_after =
            parse_env("ROSTER_WATCH_ALERT_AFTER", &lookup, DEFAULT_ALERT_AFTER)?.max(1);

        let browser_fallback = !args.no_browser
            && lookup("ROSTER_WATCH_BROWSER")
                .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no"))
                .unwrap_or(true);

        Ok(Self {
            roster_url,
            webhook_url,
            webhook_username,
            mention,
            data_file,
            poll_interval: Duration::from_secs(interval_secs),
            failure_alert_after,
            fetch: FetchConfig {
                timeout: Duration::from_millis(timeout_ms),
                max_attempts,
                backoff_base: Duration::from_millis(backoff_ms),
                browser_fallback,
                challenge_wait: Duration::from_millis(challenge_wait_ms),
            },
        })
    }
}

/// Resolve the baseline file path without requiring the rest of the config.
pub fn resolve_data_file(explicit: Option<&std::path::Path>) -> PathBuf {
    resolve_data_file_with(explicit, &|name: &str| std::env::var(name).ok())
}

fn resolve_data_file_with<F>(explicit: Option<&std::path::Path>, lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(env_path) = lookup("ROSTER_WATCH_DATA_FILE") {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_DATA_FILE)
}

/// `123` becomes `<@123>`; anything else is used verbatim.
fn normalize_mention(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        None
    } else if raw.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("<@{raw}>"))
    } else {
        Some(raw.to_string())
    }
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match url::Url::parse(value) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_env<T, F>(name: &'static str, lookup: &F, default_value: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            field: name,
            reason: format!("{raw:?}: {e}"),
        }),
        None => Ok(default_value),
    }
}
