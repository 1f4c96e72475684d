use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::{models::retry::RetryConfig, policy::DEFAULT_MATERIALITY_THRESHOLD};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_retry_sweep_interval_secs")]
    pub retry_sweep_interval_secs: u64,
    #[serde(default = "default_retry_sweep_batch_size")]
    pub retry_sweep_batch_size: usize,
    #[serde(default = "default_deferred_poll_interval_secs")]
    pub deferred_poll_interval_secs: u64,
    #[serde(default = "default_registry_refresh_interval_secs")]
    pub registry_refresh_interval_secs: u64,

    #[serde(default = "default_materiality_threshold")]
    pub materiality_threshold: f64,
}

fn default_server_port() -> u16 {
    8080
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_worker_concurrency() -> usize {
    16
}

fn default_send_timeout_ms() -> u64 {
    15_000
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    30_000
}

fn default_max_retry_delay_ms() -> u64 {
    600_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_retry_sweep_interval_secs() -> u64 {
    15
}

fn default_retry_sweep_batch_size() -> usize {
    100
}

fn default_deferred_poll_interval_secs() -> u64 {
    60
}

fn default_registry_refresh_interval_secs() -> u64 {
    300
}

fn default_materiality_threshold() -> f64 {
    DEFAULT_MATERIALITY_THRESHOLD
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.worker_concurrency == 0 {
            return Err(anyhow!("WORKER_CONCURRENCY must be at least 1"));
        }
        if self.max_retry_attempts == 0 {
            return Err(anyhow!("MAX_RETRY_ATTEMPTS must be at least 1"));
        }
        if self.retry_backoff_multiplier == 0 {
            return Err(anyhow!("RETRY_BACKOFF_MULTIPLIER must be at least 1"));
        }
        if self.materiality_threshold.is_nan() || self.materiality_threshold < 0.0 {
            return Err(anyhow!("MATERIALITY_THRESHOLD must be a non-negative number"));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from_config(self)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            retry: self.retry_config(),
            worker_concurrency: self.worker_concurrency,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            materiality_threshold: self.materiality_threshold,
            sweep_batch_size: self.retry_sweep_batch_size,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Runtime knobs of the dispatch engine, independent of how they were loaded.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub retry: RetryConfig,
    pub worker_concurrency: usize,
    pub send_timeout: Duration,
    pub materiality_threshold: f64,
    pub sweep_batch_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            worker_concurrency: default_worker_concurrency(),
            send_timeout: Duration::from_millis(default_send_timeout_ms()),
            materiality_threshold: DEFAULT_MATERIALITY_THRESHOLD,
            sweep_batch_size: default_retry_sweep_batch_size(),
        }
    }
}
