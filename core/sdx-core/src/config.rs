//! Index configuration.
//!
//! Every tunable the index reads lives in [`IndexConfig`], passed to each
//! component at construction. Values come from defaults, an optional JSON
//! file, and `SDX_*` environment variable overrides.

use crate::error::{SdxError, SdxResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "SDX_";

/// Backing store location and pool sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; `None` keeps everything in memory on a single connection.
    pub path: Option<PathBuf>,
    pub pool_size: usize,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Configuration for the document index service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub query_thread_count: usize,
    pub update_thread_count: usize,
    pub query_queue_depth: usize,
    pub update_queue_depth: usize,
    /// Implicit limit applied when a query carries no result limit.
    pub query_result_limit: usize,
    /// Rows expired per table per maintenance tick.
    pub expired_document_search_threshold: usize,
    pub maintenance_interval_ms: u64,
    /// Time budget of one expiration sweep.
    pub maintenance_deadline_ms: u64,
    pub soft_delete_enabled: bool,
    pub authorization_enabled: bool,
    pub detailed_logging: bool,
    pub slow_query_threshold_ms: u64,
    pub fetch_size: usize,
    /// Minimum lifetime of a query page service.
    pub page_ttl_floor_ms: u64,
    pub database: DatabaseConfig,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let threads = num_cpus::get() * 2;
        Self {
            query_thread_count: threads,
            update_thread_count: threads,
            query_queue_depth: 100_000,
            update_queue_depth: 100_000,
            query_result_limit: 10_000,
            expired_document_search_threshold: 1_000,
            maintenance_interval_ms: 1_000,
            maintenance_deadline_ms: 10_000,
            soft_delete_enabled: true,
            authorization_enabled: false,
            detailed_logging: false,
            slow_query_threshold_ms: 1_000,
            fetch_size: 100,
            page_ttl_floor_ms: 60_000,
            database: DatabaseConfig::default(),
        }
    }
}

impl IndexConfig {
    /// Load from a JSON file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> SdxResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut config: IndexConfig = serde_json::from_str(&raw)
            .map_err(|e| SdxError::Config(format!("{}: {e}", path.display())))?;
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SDX_*` environment variables.
    pub fn from_env() -> SdxResult<Self> {
        let mut config = IndexConfig::default();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (`SDX_QUERY_THREAD_COUNT`, ...).
    pub fn apply_env<F>(&mut self, lookup: F) -> SdxResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "QUERY_THREAD_COUNT", &mut self.query_thread_count)?;
        override_from(&lookup, "UPDATE_THREAD_COUNT", &mut self.update_thread_count)?;
        override_from(&lookup, "QUERY_QUEUE_DEPTH", &mut self.query_queue_depth)?;
        override_from(&lookup, "UPDATE_QUEUE_DEPTH", &mut self.update_queue_depth)?;
        override_from(&lookup, "QUERY_RESULT_LIMIT", &mut self.query_result_limit)?;
        override_from(
            &lookup,
            "EXPIRED_DOCUMENT_SEARCH_THRESHOLD",
            &mut self.expired_document_search_threshold,
        )?;
        override_from(&lookup, "MAINTENANCE_INTERVAL_MS", &mut self.maintenance_interval_ms)?;
        override_from(&lookup, "MAINTENANCE_DEADLINE_MS", &mut self.maintenance_deadline_ms)?;
        override_from(&lookup, "SOFT_DELETE_ENABLED", &mut self.soft_delete_enabled)?;
        override_from(&lookup, "AUTHORIZATION_ENABLED", &mut self.authorization_enabled)?;
        override_from(&lookup, "DETAILED_LOGGING", &mut self.detailed_logging)?;
        override_from(&lookup, "SLOW_QUERY_THRESHOLD_MS", &mut self.slow_query_threshold_ms)?;
        override_from(&lookup, "FETCH_SIZE", &mut self.fetch_size)?;
        override_from(&lookup, "PAGE_TTL_FLOOR_MS", &mut self.page_ttl_floor_ms)?;
        override_from(&lookup, "DB_POOL_SIZE", &mut self.database.pool_size)?;
        override_from(&lookup, "DB_BUSY_TIMEOUT_MS", &mut self.database.busy_timeout_ms)?;
        if let Some(path) = lookup(&format!("{ENV_PREFIX}DB_PATH")) {
            self.database.path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> SdxResult<()> {
        let positive = [
            ("query_thread_count", self.query_thread_count),
            ("update_thread_count", self.update_thread_count),
            ("query_queue_depth", self.query_queue_depth),
            ("update_queue_depth", self.update_queue_depth),
            ("query_result_limit", self.query_result_limit),
            (
                "expired_document_search_threshold",
                self.expired_document_search_threshold,
            ),
            ("database.pool_size", self.database.pool_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SdxError::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Semaphore permits shared by both worker pools.
    pub fn semaphore_permits(&self) -> usize {
        self.query_thread_count + self.update_thread_count
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }

    pub fn maintenance_deadline(&self) -> Duration {
        Duration::from_millis(self.maintenance_deadline_ms)
    }

    pub fn page_ttl_floor(&self) -> Duration {
        Duration::from_millis(self.page_ttl_floor_ms)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }
}

fn override_from<F, T>(lookup: &F, name: &str, target: &mut T) -> SdxResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let key = format!("{ENV_PREFIX}{name}");
    if let Some(raw) = lookup(&key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| SdxError::Config(format!("{key}: cannot parse '{raw}'")))?;
    }
    Ok(())
}
