use anyhow::{Context, Result};
use std::env;

use crate::services::reaper::{DEFAULT_SWEEP_INTERVAL_SECONDS, DEFAULT_THRESHOLD_MINUTES};

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: String,
    /// Age threshold in minutes before a stuck session is reaped.
    pub reaper_threshold_minutes: i64,
    /// Seconds between background reaper sweeps.
    pub reaper_interval_seconds: u64,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
            reaper_threshold_minutes: env::var("REAPER_THRESHOLD_MINUTES")
                .unwrap_or_else(|_| DEFAULT_THRESHOLD_MINUTES.to_string())
                .parse()
                .context("Invalid REAPER_THRESHOLD_MINUTES")?,
            reaper_interval_seconds: env::var("REAPER_INTERVAL_SECONDS")
                .unwrap_or_else(|_| DEFAULT_SWEEP_INTERVAL_SECONDS.to_string())
                .parse()
                .context("Invalid REAPER_INTERVAL_SECONDS")?,
        })
    }

    /// A configuration for tests and local tooling that never touches the
    /// environment.
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            bind_addr: "127.0.0.1:0".to_string(),
            reaper_threshold_minutes: DEFAULT_THRESHOLD_MINUTES,
            reaper_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}
