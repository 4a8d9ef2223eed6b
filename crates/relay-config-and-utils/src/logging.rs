//! Relay-flavoured entry points into the observability crate.

use tracing::Level;

const SERVICE: &str = "robot-relay";

/// Start logging for the relay process at `level` (overridable by `RUST_LOG`).
pub fn init_logging(level: &str) {
    init_logging_for_service(SERVICE, level);
}

pub fn init_logging_for_service(service_name: &str, level: &str) {
    let level = parse_level(level);
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.to_owned(),
        default_level: level.as_str().to_ascii_lowercase(),
        also_stderr: true,
        log_path: None,
    });
}

/// Lenient level parsing: case-insensitive, accepts "warning", and falls
/// back to INFO for anything unrecognised.
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => Level::WARN,
        other => other.parse().unwrap_or(Level::INFO),
    }
}
