//! Configuration management for the relay.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default listen address for robot and sender connections.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3003";

/// Default Redis URL, used when the Redis outbox backend is selected.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default bound on a single live emission.
pub const DEFAULT_EMIT_TIMEOUT_MS: u64 = 5_000;

/// Durable store holding undelivered messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// SQLite database under the base directory.
    Sqlite,
    /// Redis sorted sets.
    Redis,
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::Sqlite
    }
}

impl FromStr for StoreBackend {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "redis" => Ok(Self::Redis),
            other => Err(CoreError::Config(format!("unknown store backend: {}", other))),
        }
    }
}

/// Main relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Address the relay listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Shared secret for robot registration and sender operations.
    /// `None` or empty means the built-in default secret applies.
    #[serde(default)]
    pub shared_secret: Option<String>,
    /// Outbox backend.
    #[serde(default)]
    pub store: StoreBackend,
    /// Redis connection URL (only used with `StoreBackend::Redis`).
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Timeout for a single live emission, in milliseconds.
    #[serde(default = "default_emit_timeout_ms")]
    pub emit_timeout_ms: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

fn default_emit_timeout_ms() -> u64 {
    DEFAULT_EMIT_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            listen_addr: default_listen_addr(),
            shared_secret: None,
            store: StoreBackend::default(),
            redis_url: default_redis_url(),
            emit_timeout_ms: DEFAULT_EMIT_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> CoreResult<Self> {
        let mut config = Self::default();
        config.load_from_env()?;
        Ok(config)
    }

    /// Load configuration from the config file if present, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) -> CoreResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("RELAY_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(addr) = lookup("RELAY_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        if let Some(secret) = lookup("RELAY_SECRET") {
            self.shared_secret = Some(secret);
        }
        if let Some(store) = lookup("RELAY_STORE") {
            self.store = store.parse()?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.redis_url = url;
        }
        if let Some(ms) = lookup("RELAY_EMIT_TIMEOUT_MS") {
            self.emit_timeout_ms = ms.trim().parse().map_err(|_| {
                CoreError::Config(format!("RELAY_EMIT_TIMEOUT_MS is not a number: {}", ms))
            })?;
        }
        Ok(())
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> CoreResult<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| CoreError::Config(format!("invalid listen address {}: {}", self.listen_addr, e)))
    }

    /// Emission timeout as a Duration.
    pub fn emit_timeout(&self) -> Duration {
        Duration::from_millis(self.emit_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.store, StoreBackend::Sqlite);
        assert!(config.shared_secret.is_none());
        assert_eq!(config.emit_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(&config_path, r#"{ "log_level": "debug", "store": "redis" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.store, StoreBackend::Redis);
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(config.emit_timeout_ms, DEFAULT_EMIT_TIMEOUT_MS);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "trace".to_string(),
            shared_secret: Some("hunter2".to_string()),
            ..Default::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.log_level, "trace");
        assert_eq!(loaded.shared_secret.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                ("RELAY_LISTEN_ADDR", "127.0.0.1:4000"),
                ("RELAY_SECRET", "s3cret"),
                ("RELAY_STORE", "Redis"),
                ("RELAY_EMIT_TIMEOUT_MS", "250"),
            ]))
            .unwrap();

        assert_eq!(config.listen_addr().unwrap().port(), 4000);
        assert_eq!(config.shared_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.store, StoreBackend::Redis);
        assert_eq!(config.emit_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_overrides_are_errors() {
        let mut config = Config::default();
        assert!(config
            .apply_overrides(lookup_from(&[("RELAY_STORE", "postgres")]))
            .is_err());

        let mut config = Config::default();
        assert!(config
            .apply_overrides(lookup_from(&[("RELAY_EMIT_TIMEOUT_MS", "soon")]))
            .is_err());
    }

    #[test]
    fn test_invalid_listen_addr() {
        let config = Config {
            listen_addr: "not an address".to_string(),
            ..Default::default()
        };
        assert!(config.listen_addr().is_err());
    }
}
