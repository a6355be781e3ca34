/// Configuration management for mention-service
///
/// Loads configuration from environment variables.
use db_pool::{DbConfig, DbConfigError};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::dispatcher::DispatcherConfig;
use crate::listener::KafkaListenerConfig;
use crate::retry::RetryPolicy;

/// Brands tracked when `BRANDS` is not set
pub const DEFAULT_BRANDS: &[&str] = &[
    "apple",
    "google",
    "microsoft",
    "nvidia",
    "amazon",
    "tesla",
    "meta",
    "twitter",
    "netflix",
    "snapchat",
    "spotify",
    "uber",
    "lyft",
    "airbnb",
    "zoom",
    "slack",
    "discord",
    "tiktok",
    "pinterest",
    "reddit",
    "quora",
    "facebook",
    "instagram",
    "whatsapp",
    "linkedin",
    "youtube",
    "twitch",
    "github",
    "nintendo",
    "nba",
    "ftc",
    "openai",
    "magic",
    "bluesky",
    "python",
    "go",
    "linux",
    "zig",
    "joplin",
    "gemma",
    "cortex",
    "pope francis",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("database configuration: {0}")]
    Database(#[from] DbConfigError),
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DbConfig,
    pub kafka: KafkaListenerConfig,
    pub dispatcher: DispatcherConfig,
    /// Raw brand keywords; normalized when the `BrandSet` is built
    pub brands: Vec<String>,
    pub write_retry: RetryPolicy,
    /// HTTP port for health and metrics
    pub http_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database = DbConfig::from_env("mention-service")?;

        let kafka_defaults = KafkaListenerConfig::default();
        let kafka = KafkaListenerConfig {
            brokers: env_string("KAFKA_BROKERS", kafka_defaults.brokers),
            group_id: env_string("KAFKA_GROUP_ID", kafka_defaults.group_id),
            topic: env_string("KAFKA_STORY_TOPIC", kafka_defaults.topic),
            max_poll_interval_ms: env_or(
                "KAFKA_MAX_POLL_INTERVAL_MS",
                kafka_defaults.max_poll_interval_ms,
            )?,
        };

        let dispatcher_defaults = DispatcherConfig::default();
        let dispatcher = DispatcherConfig {
            workers: env_nonzero("MAX_WORKERS", dispatcher_defaults.workers)?,
            capacity: env_nonzero("MAX_CAPACITY", dispatcher_defaults.capacity)?,
        };

        let brands = match std::env::var("BRANDS") {
            Ok(raw) if !raw.trim().is_empty() => parse_brand_list(&raw),
            _ => DEFAULT_BRANDS.iter().map(|b| b.to_string()).collect(),
        };

        let write_retry = RetryPolicy::with_retries(
            env_or("MENTION_WRITE_MAX_RETRIES", 0)?,
            Duration::from_millis(env_or("MENTION_WRITE_RETRY_BACKOFF_MS", 100)?),
        );

        Ok(Self {
            database,
            kafka,
            dispatcher,
            brands,
            write_retry,
            http_port: env_or("PORT", 8080)?,
        })
    }
}

/// Split a comma separated keyword list, dropping blank entries
pub fn parse_brand_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|brand| !brand.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(default)
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn env_nonzero(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env_or(key, default)? {
        0 => Err(ConfigError::Zero(key)),
        value => Ok(value),
    }
}
