//! Configuration, paths, and logging setup shared by the robot-relay crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, StoreBackend, DEFAULT_EMIT_TIMEOUT_MS, DEFAULT_LISTEN_ADDR, DEFAULT_LOG_LEVEL,
    DEFAULT_REDIS_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
