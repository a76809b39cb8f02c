use std::str::FromStr;
use std::time::Duration;

use crate::runtime::keys::{
    DEFAULT_BATCH_PROCESSOR_FUNCTION, DEFAULT_PARTICIPANTS_TABLE,
    DEFAULT_SELECTION_PARTITION_INDEX,
};
use crate::runtime::retry::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};

pub const DEFAULT_PAGE_SIZE: i32 = 50;
pub const MAX_PAGE_SIZE: i32 = 1_000;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 40;
pub const DEFAULT_MAX_IN_FLIGHT_DISPATCHES: usize = 16;
pub const MAX_IN_FLIGHT_DISPATCHES_LIMIT: usize = 1_024;

pub const PARTICIPANTS_TABLE_ENV: &str = "PARTICIPANTS_TABLE";
pub const SELECTION_PARTITION_INDEX_ENV: &str = "SELECTION_PARTITION_INDEX";
pub const PAGE_SIZE_ENV: &str = "PAGE_SIZE";
pub const MAX_BATCH_SIZE_ENV: &str = "MAX_BATCH_SIZE";
pub const MAX_DISPATCH_ATTEMPTS_ENV: &str = "MAX_DISPATCH_ATTEMPTS";
pub const DISPATCH_BASE_DELAY_MS_ENV: &str = "DISPATCH_BASE_DELAY_MS";
pub const MAX_IN_FLIGHT_DISPATCHES_ENV: &str = "MAX_IN_FLIGHT_DISPATCHES";
pub const PAGE_DELAY_MS_ENV: &str = "PAGE_DELAY_MS";
pub const BATCH_PROCESSOR_FUNCTION_ENV: &str = "BATCH_PROCESSOR_FUNCTION_NAME";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{key} {message}")]
pub struct ConfigError {
    key: &'static str,
    message: String,
}

impl ConfigError {
    fn new(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }
}

/// Knobs of the scan/batch/dispatch engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_batch_size: usize,
    pub retry_policy: RetryPolicy,
    pub max_in_flight_dispatches: usize,
    pub page_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            retry_policy: RetryPolicy::default(),
            max_in_flight_dispatches: DEFAULT_MAX_IN_FLIGHT_DISPATCHES,
            page_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionProcessorConfig {
    pub table_name: String,
    pub index_name: String,
    pub page_size: i32,
    pub worker_function_name: String,
    pub engine: EngineSettings,
}

impl Default for PartitionProcessorConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_PARTICIPANTS_TABLE.to_string(),
            index_name: DEFAULT_SELECTION_PARTITION_INDEX.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            worker_function_name: DEFAULT_BATCH_PROCESSOR_FUNCTION.to_string(),
            engine: EngineSettings::default(),
        }
    }
}

impl PartitionProcessorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from a key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let page_size = parse_or(&lookup, PAGE_SIZE_ENV, defaults.page_size)?;
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ConfigError::new(
                PAGE_SIZE_ENV,
                format!("must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"),
            ));
        }

        let max_batch_size = parse_or(&lookup, MAX_BATCH_SIZE_ENV, DEFAULT_MAX_BATCH_SIZE)?;
        if max_batch_size == 0 {
            return Err(ConfigError::new(
                MAX_BATCH_SIZE_ENV,
                "must be a positive integer",
            ));
        }

        let max_in_flight_dispatches = parse_or(
            &lookup,
            MAX_IN_FLIGHT_DISPATCHES_ENV,
            DEFAULT_MAX_IN_FLIGHT_DISPATCHES,
        )?;
        if !(1..=MAX_IN_FLIGHT_DISPATCHES_LIMIT).contains(&max_in_flight_dispatches) {
            return Err(ConfigError::new(
                MAX_IN_FLIGHT_DISPATCHES_ENV,
                format!(
                    "must be between 1 and {MAX_IN_FLIGHT_DISPATCHES_LIMIT}, got {max_in_flight_dispatches}"
                ),
            ));
        }

        let max_attempts = parse_or(&lookup, MAX_DISPATCH_ATTEMPTS_ENV, DEFAULT_MAX_ATTEMPTS)?;
        let base_delay_ms = parse_or(&lookup, DISPATCH_BASE_DELAY_MS_ENV, DEFAULT_BASE_DELAY_MS)?;
        let retry_policy = RetryPolicy::new(max_attempts, Duration::from_millis(base_delay_ms))
            .map_err(|error| ConfigError::new(MAX_DISPATCH_ATTEMPTS_ENV, error.message()))?;

        let page_delay_ms: u64 = parse_or(&lookup, PAGE_DELAY_MS_ENV, 0)?;

        Ok(Self {
            table_name: text_or(&lookup, PARTICIPANTS_TABLE_ENV, defaults.table_name),
            index_name: text_or(&lookup, SELECTION_PARTITION_INDEX_ENV, defaults.index_name),
            page_size,
            worker_function_name: text_or(
                &lookup,
                BATCH_PROCESSOR_FUNCTION_ENV,
                defaults.worker_function_name,
            ),
            engine: EngineSettings {
                max_batch_size,
                retry_policy,
                max_in_flight_dispatches,
                page_delay: Duration::from_millis(page_delay_ms),
            },
        })
    }
}

fn present(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn text_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: String) -> String {
    present(lookup, key).unwrap_or(default)
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match present(lookup, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            ConfigError::new(key, format!("must be a non-negative integer, got '{raw}'"))
        }),
    }
}
