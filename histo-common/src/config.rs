// histo-common/src/config.rs
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use tracing::debug;

use super::error::{HistoError, Result};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";
const DEFAULT_FALLBACK_HOME: &str = ".histo";

const DEFAULT_POLL_ACTIVE_MS: u64 = 200;
const DEFAULT_POLL_PAUSED_MS: u64 = 600;
const DEFAULT_POLL_BACKOFF_MS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CATALOG_REFRESH_ATTEMPTS: u32 = 5;

/// Poll cadence for one job loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Interval while `starting`, `downloading`, or while the worker reports `unknown`.
    pub active: Duration,
    /// Interval while `paused`; no progress is expected.
    pub paused: Duration,
    /// Interval after a transport or parse failure.
    pub backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            active: Duration::from_millis(DEFAULT_POLL_ACTIVE_MS),
            paused: Duration::from_millis(DEFAULT_POLL_PAUSED_MS),
            backoff: Duration::from_millis(DEFAULT_POLL_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub histo_home: PathBuf,
    pub poll: PollSettings,
    pub request_timeout: Duration,
    pub catalog_refresh_attempts: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading histo configuration");

        let api_base_url = env::var("HISTO_API_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| {
                debug!(
                    "HISTO_API_URL not set or empty, falling back to default: {}",
                    DEFAULT_API_URL
                );
                DEFAULT_API_URL.to_string()
            });

        let histo_home = match env::var("HISTO_HOME").ok().filter(|s| !s.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "histo")
                .map(|dirs| dirs.data_local_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FALLBACK_HOME)),
        };
        debug!("Effective HISTO_HOME set to: {}", histo_home.display());

        let poll = PollSettings {
            active: Duration::from_millis(env_or("HISTO_POLL_ACTIVE_MS", DEFAULT_POLL_ACTIVE_MS)),
            paused: Duration::from_millis(env_or("HISTO_POLL_PAUSED_MS", DEFAULT_POLL_PAUSED_MS)),
            backoff: Duration::from_millis(env_or(
                "HISTO_POLL_BACKOFF_MS",
                DEFAULT_POLL_BACKOFF_MS,
            )),
        };
        let request_timeout = Duration::from_secs(env_or(
            "HISTO_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ));
        let catalog_refresh_attempts = env_or(
            "HISTO_CATALOG_REFRESH_ATTEMPTS",
            DEFAULT_CATALOG_REFRESH_ATTEMPTS,
        );

        let config = Self {
            api_base_url,
            histo_home,
            poll,
            request_timeout,
            catalog_refresh_attempts,
        };
        config.validate()?;
        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    /// Rejects durations that would make every poll or request fire or time out immediately.
    pub fn validate(&self) -> Result<()> {
        let poll = &self.poll;
        if poll.active.is_zero() || poll.paused.is_zero() || poll.backoff.is_zero() {
            return Err(HistoError::Config(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(HistoError::Config(
                "HISTO_REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds a configuration for the given worker URL without touching the environment.
    pub fn for_api_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            histo_home: PathBuf::from(DEFAULT_FALLBACK_HOME),
            poll: PollSettings::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            catalog_refresh_attempts: DEFAULT_CATALOG_REFRESH_ATTEMPTS,
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.histo_home.join("logs")
    }
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            debug!("Ignoring unparsable {}={:?}, using {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_cadence() {
        let poll = PollSettings::default();
        assert_eq!(poll.active, Duration::from_millis(200));
        assert_eq!(poll.paused, Duration::from_millis(600));
        assert_eq!(poll.backoff, Duration::from_millis(300));
        assert!(poll.active < poll.backoff && poll.backoff < poll.paused);
    }

    #[test]
    fn for_api_url_skips_environment() {
        let config = Config::for_api_url("http://localhost:9999/api");
        assert_eq!(config.api_base_url, "http://localhost:9999/api");
        assert_eq!(config.poll, PollSettings::default());
        assert_eq!(config.logs_dir(), PathBuf::from(".histo").join("logs"));
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        let mut config = Config::for_api_url("http://localhost:9999/api");
        assert!(config.validate().is_ok());
        config.request_timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(HistoError::Config(_))));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = Config::for_api_url("http://localhost:9999/api").with_poll_settings(PollSettings {
            paused: Duration::ZERO,
            ..PollSettings::default()
        });
        assert!(matches!(config.validate(), Err(HistoError::Config(_))));
    }

    #[test]
    fn env_or_defaults_when_unset() {
        assert_eq!(env_or("HISTO_TEST_UNSET_VARIABLE_FOR_CONFIG", 7u64), 7);
    }
}
