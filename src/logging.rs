//! Tracing subscriber setup for the binary.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{Level, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::constants::logging;

/// Unknown or missing values fall back to INFO
pub fn parse_level(value: Option<&str>) -> Level {
    match value.unwrap_or("info").trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

pub fn log_file_path() -> PathBuf {
    std::env::temp_dir().join(logging::DIR).join(logging::FILENAME)
}

/// Install the global subscriber writing to stderr and the log file.
///
/// If the log file cannot be opened, logging continues on stderr only.
pub fn init() -> Result<()> {
    let level = parse_level(std::env::var(logging::LEVEL_ENV).ok().as_deref());
    let path = log_file_path();

    let (writer, file_error) = match open_log_file(&path) {
        Ok(file) => (
            BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file))),
            None,
        ),
        Err(e) => (BoxMakeWriter::new(std::io::stderr), Some(e)),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    if let Some(e) = file_error {
        warn!(path = %path.display(), error = %e, "Logging to stderr only");
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {:?}", dir))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {:?}", path))
}
