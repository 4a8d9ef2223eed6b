//! Central JSONL log file used by `--features dev` builds.
//!
//! Every relay process appends to the same file. Each event is written and
//! flushed under one lock so lines from different processes never interleave.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "dev.jsonl";

/// Shared append-only handle on the central log file.
#[derive(Clone)]
pub struct CentralLogWriter {
    file: Arc<Mutex<LineWriter<File>>>,
}

impl CentralLogWriter {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(LineWriter::new(file))),
        })
    }
}

impl Write for CentralLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file.lock();
        file.write_all(buf)?;
        file.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

/// Hands the JSON layer a clone of the shared writer per event.
#[derive(Clone)]
pub struct WriterFactory(CentralLogWriter);

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = CentralLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.0.clone()
    }
}

fn log_path(config: &LogConfig) -> PathBuf {
    if let Some(path) = &config.log_path {
        return path.clone();
    }
    crate::default_log_dir()
        .unwrap_or_else(|| std::env::temp_dir().join("robot-relay"))
        .join(LOG_FILE_NAME)
}

fn filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
}

/// Install JSONL output to the central file, plus stderr when asked for.
///
/// If the file cannot be opened the process still logs, to stderr only.
pub fn init_dev_subscriber(config: &LogConfig) {
    let path = log_path(config);

    let file_layer = CentralLogWriter::new(&path)
        .map_err(|e| eprintln!("observability: cannot open {}: {}", path.display(), e))
        .ok()
        .map(|writer| {
            JsonLayer::new(config.service_name.clone(), WriterFactory(writer))
                .with_filter(filter(config))
        });

    let stderr_layer = (config.also_stderr || file_layer.is_none()).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
            .with_filter(filter(config))
    });

    if tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok()
    {
        tracing::info!(log_path = %path.display(), service = %config.service_name, "Logging to central file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writer_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("relay.jsonl");

        let mut writer = CentralLogWriter::new(&path).unwrap();
        writer.write_all(b"{\"n\":1}\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"n\":1}\n");
    }

    #[test]
    fn separate_writers_append_to_one_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.jsonl");

        CentralLogWriter::new(&path).unwrap().write_all(b"one\n").unwrap();
        CentralLogWriter::new(&path).unwrap().write_all(b"two\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn explicit_log_path_wins() {
        let config = LogConfig {
            log_path: Some(PathBuf::from("/tmp/relay-test.jsonl")),
            ..LogConfig::default()
        };
        assert_eq!(log_path(&config), PathBuf::from("/tmp/relay-test.jsonl"));

        let default = log_path(&LogConfig::default());
        assert!(default.ends_with(LOG_FILE_NAME));
    }
}
