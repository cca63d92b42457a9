//! Lantern configuration.
//!
//! Configuration is read from TOML. Every option has a default, so an empty file (or no file
//! at all) is valid. The option names exposed to editor settings (`expiryTimeMs`,
//! `maxCacheSize`, ...) are accepted as aliases of the snake_case keys.

use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use lantern_cache::TtlCacheSettings;
use lantern_scheduler::{GateSettings, RetryPolicy};
use lantern_vfs::{ExcludeFilter, DEFAULT_EXCLUDED_DIRS};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid value for `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `Display` would include a snippet of the input; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanternConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub inspection: InspectionConfig,
}

impl LanternConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    /// Parses and validates a TOML document.
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let config: LanternConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.expiry_time_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.expiry_time_ms",
                message: "must be greater than zero".into(),
            });
        }
        if self.cache.max_cache_size == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.max_cache_size",
                message: "must be at least 1".into(),
            });
        }
        if self.inspection.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "inspection.max_concurrency",
                message: "must be at least 1".into(),
            });
        }
        if self.cache.cleanup_interval_ms > self.cache.expiry_time_ms {
            // Late sweeps only delay reclamation; reads re-validate regardless.
            tracing::warn!(
                target = "lantern.config",
                cleanup_interval_ms = self.cache.cleanup_interval_ms,
                expiry_time_ms = self.cache.expiry_time_ms,
                "cleanup interval is longer than the cache expiry time"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// Effective filter: the configured level, with `RUST_LOG` merged on top when set.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        match env_directives {
            Some(env_directives) => {
                let config_directives = Self::normalize_level_directives(&self.level);
                tracing_subscriber::EnvFilter::try_new(format!("{config_directives},{env_directives}"))
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_expiry_time_ms", alias = "expiryTimeMs")]
    pub expiry_time_ms: u64,

    #[serde(default = "CacheConfig::default_max_cache_size", alias = "maxCacheSize")]
    pub max_cache_size: usize,

    #[serde(
        default = "CacheConfig::default_cleanup_interval_ms",
        alias = "cleanupIntervalMs"
    )]
    pub cleanup_interval_ms: u64,

    /// Re-check file fingerprints on authoritative reads.
    #[serde(default = "default_true", alias = "enableContentHashing")]
    pub enable_content_hashing: bool,

    /// Only serve cached entries while the caret stays near where they were computed.
    #[serde(default, alias = "enablePositionSensitive")]
    pub enable_position_sensitive: bool,

    #[serde(
        default = "CacheConfig::default_max_caret_distance",
        alias = "maxCaretDistance"
    )]
    pub max_caret_distance: u32,

    /// Skip change events for resources that have no cache entry.
    #[serde(default = "default_true", alias = "watchOnlyCachedFiles")]
    pub watch_only_cached_files: bool,

    #[serde(
        default = "CacheConfig::default_watcher_exclude_dirs",
        alias = "watcherExcludeDirs"
    )]
    pub watcher_exclude_dirs: Vec<String>,
}

impl CacheConfig {
    fn default_expiry_time_ms() -> u64 {
        5 * 60 * 1_000
    }

    fn default_max_cache_size() -> usize {
        100
    }

    fn default_cleanup_interval_ms() -> u64 {
        60 * 1_000
    }

    fn default_max_caret_distance() -> u32 {
        8_192
    }

    fn default_watcher_exclude_dirs() -> Vec<String> {
        DEFAULT_EXCLUDED_DIRS.iter().map(|dir| (*dir).to_owned()).collect()
    }

    pub fn ttl_settings(&self) -> TtlCacheSettings {
        TtlCacheSettings {
            ttl: Duration::from_millis(self.expiry_time_ms),
            max_entries: self.max_cache_size,
            cleanup_interval: Duration::from_millis(self.cleanup_interval_ms),
            content_hashing: self.enable_content_hashing,
            position_sensitive: self.enable_position_sensitive,
            max_caret_distance: self.max_caret_distance,
        }
    }

    pub fn exclude_filter(&self) -> ExcludeFilter {
        ExcludeFilter::new(self.watcher_exclude_dirs.iter().cloned())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiry_time_ms: Self::default_expiry_time_ms(),
            max_cache_size: Self::default_max_cache_size(),
            cleanup_interval_ms: Self::default_cleanup_interval_ms(),
            enable_content_hashing: true,
            enable_position_sensitive: false,
            max_caret_distance: Self::default_max_caret_distance(),
            watch_only_cached_files: true,
            watcher_exclude_dirs: Self::default_watcher_exclude_dirs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionConfig {
    /// Maximum number of backend calls in flight across all documents.
    #[serde(
        default = "InspectionConfig::default_max_concurrency",
        alias = "maxConcurrency"
    )]
    pub max_concurrency: usize,

    #[serde(
        default = "InspectionConfig::default_debounce_wait_ms",
        alias = "debounceWaitMs"
    )]
    pub debounce_wait_ms: u64,

    #[serde(
        default = "InspectionConfig::default_retry_interval_ms",
        alias = "retryIntervalMs"
    )]
    pub retry_interval_ms: u64,

    #[serde(
        default = "InspectionConfig::default_retry_deadline_ms",
        alias = "retryDeadlineMs"
    )]
    pub retry_deadline_ms: u64,
}

impl InspectionConfig {
    fn default_max_concurrency() -> usize {
        3
    }

    fn default_debounce_wait_ms() -> u64 {
        800
    }

    fn default_retry_interval_ms() -> u64 {
        1_000
    }

    fn default_retry_deadline_ms() -> u64 {
        10_000
    }

    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            max_concurrency: self.max_concurrency,
        }
    }

    pub fn debounce_wait(&self) -> Duration {
        Duration::from_millis(self.debounce_wait_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.retry_interval_ms),
            deadline: Duration::from_millis(self.retry_deadline_ms),
        }
    }
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: Self::default_max_concurrency(),
            debounce_wait_ms: Self::default_debounce_wait_ms(),
            retry_interval_ms: Self::default_retry_interval_ms(),
            retry_deadline_ms: Self::default_retry_deadline_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

static TRACING_INIT: Once = Once::new();

/// Installs the global tracing subscriber, writing to stderr.
///
/// Only the first call has an effect. If another global subscriber is already installed,
/// it is left in place.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true);
        let result = if config.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        if result.is_ok() {
            tracing::debug!(target = "lantern.config", json = config.json, "tracing initialized");
        }
    });
}
