//! Environment-driven configuration (spec §6 configuration table).

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidInteger { name: &'static str, value: String },
}

/// Runtime configuration for the execution core, loaded from the process
/// environment. `.env` files are loaded first via `dotenvy` if present.
#[derive(Debug, Clone)]
pub struct Config {
    pub event_stream_address: Option<String>,
    pub job_queue_address: Option<String>,
    pub trigger_concurrency: usize,
    pub executor_concurrency: usize,
    pub job_attempts: u32,
    pub job_backoff_initial: Duration,
    pub step_timeout_default: Duration,
    pub step_retry_cap: Duration,
    pub checkpoint_retention: usize,
    pub live_channel_ping: Duration,
    pub live_channel_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables, applying the defaults
    /// enumerated in spec §6 for anything unset. Returns `Err` for values
    /// present but unparseable (misconfiguration, exit code 2 at startup).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            event_stream_address: env_string("EVENT_STREAM_ADDRESS"),
            job_queue_address: env_string("JOB_QUEUE_ADDRESS"),
            trigger_concurrency: env_usize("TRIGGER_CONCURRENCY", 5)?,
            executor_concurrency: env_usize("EXECUTOR_CONCURRENCY", 5)?,
            job_attempts: env_u32("JOB_ATTEMPTS", 3)?,
            job_backoff_initial: Duration::from_millis(env_u64("JOB_BACKOFF_INITIAL_MS", 2_000)?),
            step_timeout_default: Duration::from_millis(env_u64("STEP_TIMEOUT_DEFAULT_MS", 30_000)?),
            step_retry_cap: Duration::from_millis(env_u64("STEP_RETRY_CAP_MS", 10_000)?),
            checkpoint_retention: env_usize("CHECKPOINT_RETENTION", 10)?,
            live_channel_ping: Duration::from_millis(env_u64("LIVE_CHANNEL_PING_MS", 25_000)?),
            live_channel_timeout: Duration::from_millis(env_u64("LIVE_CHANNEL_TIMEOUT_MS", 60_000)?),
        })
    }
}

fn env_string(name: &'static str) -> Option<String> {
    std::env::var(name).ok()
}

fn env_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidInteger { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn env_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidInteger { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidInteger { name, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("TRIGGER_CONCURRENCY");
        let config = Config::from_env().unwrap();
        assert_eq!(config.trigger_concurrency, 5);
        assert_eq!(config.checkpoint_retention, 10);
    }

    #[test]
    fn invalid_integer_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("JOB_ATTEMPTS", "not-a-number");
        let result = Config::from_env();
        std::env::remove_var("JOB_ATTEMPTS");
        assert!(result.is_err());
    }
}
