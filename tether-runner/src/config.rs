//! Runner configuration
//!
//! Defines the configurable parameters for the runner: its identity, how
//! many job connections it keeps open, and transport timing.

use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this runner instance
    pub runner_id: String,

    /// Maximum number of job connections open at once
    pub max_active_jobs: usize,

    /// How long a job may run before it is stopped
    pub job_timeout: Duration,

    /// Simulated latency between a binding request and its connect callback
    pub connect_delay: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(runner_id: String) -> Self {
        Self {
            runner_id,
            max_active_jobs: 8,
            job_timeout: Duration::from_secs(30),
            connect_delay: Duration::ZERO,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - RUNNER_ID (required)
    /// - MAX_ACTIVE_JOBS (optional, default: 8)
    /// - JOB_TIMEOUT (optional, seconds, default: 30)
    /// - CONNECT_DELAY_MS (optional, milliseconds, default: 0)
    pub fn from_env() -> anyhow::Result<Self> {
        let runner_id = std::env::var("RUNNER_ID")
            .map_err(|_| anyhow::anyhow!("RUNNER_ID environment variable not set"))?;

        let mut config = Self::new(runner_id);

        if let Some(max_active_jobs) = parse_env::<usize>("MAX_ACTIVE_JOBS") {
            config.max_active_jobs = max_active_jobs;
        }

        if let Some(secs) = parse_env::<u64>("JOB_TIMEOUT") {
            config.job_timeout = Duration::from_secs(secs);
        }

        if let Some(millis) = parse_env::<u64>("CONNECT_DELAY_MS") {
            config.connect_delay = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        if self.max_active_jobs == 0 {
            anyhow::bail!("max_active_jobs must be greater than 0");
        }

        if self.job_timeout.is_zero() {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        if self.connect_delay >= self.job_timeout {
            anyhow::bail!("connect_delay must be shorter than job_timeout");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}
