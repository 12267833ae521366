//! Configuration data types for the bot.
//!
//! This module contains all the data structures used for configuration,
//! including Telegram access, monitor tuning and database settings.

use alloc::sync::Arc;
use core::{num::NonZero, time::Duration};
use std::{
    path::{Component, Path, PathBuf},
    thread,
};

use secrecy::SecretString;
use serde::Deserialize;
use vpswatch_common::DEFAULT_PROBE_PORT;

/// Telegram Bot API access.
#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    /// Token handed out by `@BotFather`. Required.
    pub bot_token: Arc<SecretString>,
    /// API root, without the `/bot<token>` suffix. Overridable for tests and proxies.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Long-poll duration passed to `getUpdates`.
    #[serde(default = "default_poll_timeout_seconds")]
    pub poll_timeout_seconds: u64,
}

/// Tuning of the periodic sweep and of on-demand probes.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Seconds between two sweeps.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Seconds to wait after startup before the first sweep.
    #[serde(default = "default_startup_delay_seconds")]
    pub startup_delay_seconds: u64,
    /// Connect timeout of a single probe.
    #[serde(default = "default_probe_timeout_seconds")]
    pub probe_timeout_seconds: u64,
    /// Port used for addresses given without one.
    #[serde(default = "default_port")]
    pub default_port: u16,
    /// Upper bound of simultaneous probes within one sweep.
    /// Derived from the CPU count when omitted.
    #[serde(default)]
    pub max_concurrent_probes: Option<usize>,
    /// Upper bound of simultaneous probes for one add or ping request.
    #[serde(default = "default_ping_concurrency")]
    pub ping_concurrency: usize,
    /// Minimum spacing between two outgoing notifications.
    #[serde(default = "default_notify_min_interval_ms")]
    pub notify_min_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            startup_delay_seconds: default_startup_delay_seconds(),
            probe_timeout_seconds: default_probe_timeout_seconds(),
            default_port: default_port(),
            max_concurrent_probes: None,
            ping_concurrency: default_ping_concurrency(),
            notify_min_interval_ms: default_notify_min_interval_ms(),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    #[must_use]
    pub const fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_seconds)
    }

    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    #[must_use]
    pub const fn notify_min_interval(&self) -> Duration {
        Duration::from_millis(self.notify_min_interval_ms)
    }

    /// Effective sweep concurrency.
    #[must_use]
    pub fn max_concurrent_probes(&self) -> usize {
        self.max_concurrent_probes
            .unwrap_or_else(default_max_concurrent_probes)
    }
}

/// Configuration for an optional local `SQLite` database.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Path to the `SQLite` database file. Relative paths are resolved relative to the config file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Whether the local DB is enabled. When false the bot keeps endpoints in memory
    /// even if this table exists in the config file.
    #[serde(default = "do_db_enable")]
    pub enable: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            enable: do_db_enable(),
        }
    }
}

/// Root config structure of the bot.
#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Optional database configuration. When omitted endpoints are kept in memory.
    #[serde(default)]
    pub db: Option<DbConfig>,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

const fn default_poll_timeout_seconds() -> u64 {
    30
}

const fn default_interval_seconds() -> u64 {
    300
}

const fn default_startup_delay_seconds() -> u64 {
    10
}

const fn default_probe_timeout_seconds() -> u64 {
    3
}

const fn default_port() -> u16 {
    DEFAULT_PROBE_PORT
}

const fn default_ping_concurrency() -> usize {
    8
}

const fn default_notify_min_interval_ms() -> u64 {
    50
}

/// Eight probes per CPU, but never fewer than 8 or more than 64.
fn default_max_concurrent_probes() -> usize {
    thread::available_parallelism()
        .map_or(1, NonZero::get)
        .saturating_mul(8)
        .clamp(8, 64)
}

fn default_db_path() -> String {
    "./vpswatch.db".to_string()
}

const fn do_db_enable() -> bool {
    true
}

/// Resolves a path to an absolute one.
///
/// If the path is absolute, returns it as-is. If relative, joins it with the
/// config file's parent directory and normalizes the result to remove redundant
/// components like `./`.
///
/// # Arguments
///
/// * `config_path` - Path to the config file
/// * `relative_path` - Path to resolve (may be absolute or relative)
///
/// # Returns
///
/// A normalized absolute path
#[must_use]
pub fn resolve_config_relative_paths(config_path: &Path, relative_path: &str) -> PathBuf {
    let path = Path::new(relative_path);
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        config_path
            .parent()
            .map_or_else(|| path.to_path_buf(), |d| d.join(path))
    };

    // We can't use canonicalize() because the file might not exist yet
    normalize_path(&resolved)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        use Component as C;
        match component {
            C::Normal(c) => {
                result.push(c);
            }
            C::ParentDir => {
                result.pop();
            }
            C::CurDir => {}
            C::RootDir | C::Prefix(_) => {
                result.push(component);
            }
        }
    }
    result
}
