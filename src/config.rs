use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};
use tracing::{info, warn};

pub const DEFAULT_DEDUPE_WINDOW_SECS: u64 = 60;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;

/// Runtime settings, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub dedupe_window: Duration,
    pub ping_interval: Duration,
    /// Hostnames of the dashboard deployment itself. Subdomains match too.
    pub dashboard_hosts: Vec<String>,
    /// Track loopback hosts instead of treating them as the dashboard.
    pub allow_local: bool,
    /// Reporting endpoint used when a request carries no `Host` header.
    pub public_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            data_path: PathBuf::from("data/events.json"),
            dedupe_window: Duration::from_secs(DEFAULT_DEDUPE_WINDOW_SECS),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            dashboard_hosts: Vec::new(),
            allow_local: false,
            public_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: try_load("PORT", defaults.port),
            data_path: env::var("APP_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            dedupe_window: load_secs("TRACKER_DEDUPE_WINDOW_SECS", DEFAULT_DEDUPE_WINDOW_SECS),
            ping_interval: load_secs("TRACKER_PING_INTERVAL_SECS", DEFAULT_PING_INTERVAL_SECS),
            dashboard_hosts: env::var("TRACKER_DASHBOARD_HOSTS")
                .map(|value| parse_hosts(&value))
                .unwrap_or_default(),
            allow_local: try_load("TRACKER_ALLOW_LOCAL", defaults.allow_local),
            public_url: env::var("TRACKER_PUBLIC_URL")
                .ok()
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty()),
        }
    }
}

pub fn parse_hosts(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|host| host.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .collect()
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    parse_or_default(key, env::var(key).ok().as_deref(), default)
}

fn parse_or_default<T>(key: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|err| {
            warn!("invalid {key} value {raw:?}: {err}, using default {default}");
            default
        }),
        None => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

fn load_secs(key: &str, default: u64) -> Duration {
    secs_or_default(key, env::var(key).ok().as_deref(), default)
}

/// Windows and intervals must be positive: a zero ping interval would spin
/// the pinger and the served script.
fn secs_or_default(key: &str, raw: Option<&str>, default: u64) -> Duration {
    match parse_or_default(key, raw, default) {
        0 => {
            warn!("{key} must be greater than zero, using default {default}");
            Duration::from_secs(default)
        }
        secs => Duration::from_secs(secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hosts_normalises_entries() {
        let hosts = parse_hosts(" Dash.Example.com, ,.shop-analytics.io ");
        assert_eq!(hosts, vec!["dash.example.com", "shop-analytics.io"]);
    }

    #[test]
    fn defaults_use_canonical_windows() {
        let config = Config::default();
        assert_eq!(config.dedupe_window, Duration::from_secs(60));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert!(!config.allow_local);
    }

    #[test]
    fn zero_durations_fall_back_to_defaults() {
        assert_eq!(
            secs_or_default("TRACKER_PING_INTERVAL_SECS", Some("0"), DEFAULT_PING_INTERVAL_SECS),
            Duration::from_secs(30)
        );
        assert_eq!(
            secs_or_default("TRACKER_DEDUPE_WINDOW_SECS", Some(" 0 "), DEFAULT_DEDUPE_WINDOW_SECS),
            Duration::from_secs(60)
        );
        assert_eq!(
            secs_or_default("TRACKER_PING_INTERVAL_SECS", Some("15"), DEFAULT_PING_INTERVAL_SECS),
            Duration::from_secs(15)
        );
        assert_eq!(
            secs_or_default("TRACKER_PING_INTERVAL_SECS", Some("-5"), DEFAULT_PING_INTERVAL_SECS),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn unset_values_use_default() {
        assert_eq!(parse_or_default("PORT", None, 8080u16), 8080);
        assert!(parse_or_default("TRACKER_ALLOW_LOCAL", Some("true"), false));
    }
}
