//! Configuration for the panic core.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::capabilities::{ValidatedUrl, MAX_TIMEOUT_MS};
use crate::{
    CONFIRM_WINDOW, COUNTDOWN_TICKS, COUNTDOWN_TICK_INTERVAL, DEFAULT_ALERT_PATH,
    DEGRADED_ACCURACY_M, LAST_ALERT_KEY, LOCATION_TIMEOUT, READING_MAX_AGE, SUBMIT_TIMEOUT,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PanicConfig {
    /// Base URL of the campus REST backend (e.g. "https://api.example.edu/api").
    pub api_base_url: String,
    /// Path of the alert-creation endpoint, relative to the base URL.
    pub alert_path: String,
    /// How long a first press waits for the confirming second press.
    pub confirm_window: Duration,
    /// Number of countdown ticks between consent and submission.
    pub countdown_ticks: u8,
    pub tick_interval: Duration,
    /// Accuracy radius above which the fix is flagged as degraded.
    pub degraded_accuracy_m: f64,
    /// Upper bound on a fresh location fix before falling back to cache.
    pub location_timeout: Duration,
    /// How long the fix captured at press stays usable when submission
    /// finds neither a fresh nor a platform-cached reading.
    pub reading_max_age: Duration,
    pub request_timeout: Duration,
    /// Permit loopback/private hosts in `api_base_url` (local development).
    pub allow_private_hosts: bool,
    pub last_alert_key: String,
}

impl Default for PanicConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.example.edu/api".to_string(),
            alert_path: DEFAULT_ALERT_PATH.to_string(),
            confirm_window: CONFIRM_WINDOW,
            countdown_ticks: COUNTDOWN_TICKS,
            tick_interval: COUNTDOWN_TICK_INTERVAL,
            degraded_accuracy_m: DEGRADED_ACCURACY_M,
            location_timeout: LOCATION_TIMEOUT,
            reading_max_age: READING_MAX_AGE,
            request_timeout: SUBMIT_TIMEOUT,
            allow_private_hosts: false,
            last_alert_key: LAST_ALERT_KEY.to_string(),
        }
    }
}

impl PanicConfig {
    /// Create configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `PANIC_API_BASE_URL` - backend base URL
    /// - `PANIC_ALERT_PATH` - alert-creation path (default: /panic)
    /// - `PANIC_CONFIRM_WINDOW_MS` - confirmation window (default: 3000)
    /// - `PANIC_COUNTDOWN_TICKS` - countdown length (default: 3)
    /// - `PANIC_TICK_INTERVAL_MS` - countdown tick interval (default: 1000)
    /// - `PANIC_DEGRADED_ACCURACY_M` - degraded accuracy threshold (default: 1000)
    /// - `PANIC_LOCATION_TIMEOUT_MS` - fresh fix timeout (default: 10000)
    /// - `PANIC_READING_MAX_AGE_MS` - press-time fix fallback age (default: 120000)
    /// - `PANIC_REQUEST_TIMEOUT_MS` - submission timeout (default: 30000, max: 300000)
    /// - `PANIC_ALLOW_PRIVATE_HOSTS` - allow loopback/private base URLs (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`PanicConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("PANIC_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Some(path) = lookup("PANIC_ALERT_PATH") {
            config.alert_path = path;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PANIC_CONFIRM_WINDOW_MS")? {
            config.confirm_window = Duration::from_millis(ms);
        }
        if let Some(ticks) = parse_var::<u8>(&lookup, "PANIC_COUNTDOWN_TICKS")? {
            config.countdown_ticks = ticks;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PANIC_TICK_INTERVAL_MS")? {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(meters) = parse_var::<f64>(&lookup, "PANIC_DEGRADED_ACCURACY_M")? {
            config.degraded_accuracy_m = meters;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PANIC_LOCATION_TIMEOUT_MS")? {
            config.location_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PANIC_READING_MAX_AGE_MS")? {
            config.reading_max_age = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PANIC_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(allow) = parse_var::<bool>(&lookup, "PANIC_ALLOW_PRIVATE_HOSTS")? {
            config.allow_private_hosts = allow;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ValidatedUrl::with_policy(&self.api_base_url, self.allow_private_hosts)
            .map_err(|e| ConfigError::invalid("api_base_url", e.to_string()))?;

        if !self.alert_path.starts_with('/') {
            return Err(ConfigError::invalid("alert_path", "must start with '/'"));
        }
        if self.confirm_window.is_zero() {
            return Err(ConfigError::invalid("confirm_window", "must be > 0"));
        }
        if self.countdown_ticks == 0 {
            return Err(ConfigError::invalid("countdown_ticks", "must be >= 1"));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::invalid("tick_interval", "must be > 0"));
        }
        if !self.degraded_accuracy_m.is_finite() || self.degraded_accuracy_m <= 0.0 {
            return Err(ConfigError::invalid(
                "degraded_accuracy_m",
                "must be a positive number",
            ));
        }
        if self.location_timeout.is_zero() {
            return Err(ConfigError::invalid("location_timeout", "must be > 0"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout", "must be > 0"));
        }
        if self.request_timeout > Duration::from_millis(MAX_TIMEOUT_MS) {
            return Err(ConfigError::invalid(
                "request_timeout",
                format!("must be <= {MAX_TIMEOUT_MS}ms"),
            ));
        }
        if self.last_alert_key.trim().is_empty() {
            return Err(ConfigError::invalid("last_alert_key", "cannot be empty"));
        }
        Ok(())
    }

    /// Full URL of the alert-creation endpoint.
    #[must_use]
    pub fn alert_url(&self) -> String {
        format!(
            "{}{}",
            self.api_base_url.trim_end_matches('/'),
            self.alert_path
        )
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(name, format!("'{raw}': {e}"))),
    }
}
