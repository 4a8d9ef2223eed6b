//! Logging setup shared by the robot-relay binaries.
//!
//! A binary calls [`init`] or [`init_with_config`] once, early in `main`,
//! then logs with plain `tracing` macros. Where the output goes is decided
//! here:
//!
//! - default builds print compact lines to stderr;
//! - `dev` builds append JSONL to `~/.robot-relay/logs/dev.jsonl`, which
//!   `tail -f ... | jq` can follow across every relay process.
//!
//! `RUST_LOG` overrides the configured level in both modes.

#[cfg(feature = "dev")]
mod dev;
mod json_layer;

use std::path::PathBuf;

pub use json_layer::{JsonLayer, LogEntry};
pub use tracing::{debug, error, info, instrument, trace, warn, Level};

/// How a process wants its logs set up.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Stamped on every JSONL line as `service`.
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_level: String,
    /// Central file override (dev builds only).
    pub log_path: Option<PathBuf>,
    /// Mirror to stderr in dev builds.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..LogConfig::default()
    });
}

/// Install the global subscriber. A second call leaves the first in place.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    dev::init_dev_subscriber(&config);

    #[cfg(not(feature = "dev"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level));
        let _ = tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .finish()
            .try_init();
    }
}

/// `~/.robot-relay/logs`, when a home directory is known.
pub fn default_log_dir() -> Option<PathBuf> {
    Some(dirs::home_dir()?.join(".robot-relay").join("logs"))
}
