//! File-backed tracing setup.
//!
//! The terminal belongs to the UI, so events only go to a file. With no file
//! configured nothing is installed and every `tracing` macro is a no-op.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub const LOG_FILE_ENV: &str = "REELFEED_LOG";

/// Installs the global subscriber. Returns the log path when one was set up.
pub fn init(cfg: &LogConfig) -> Result<Option<PathBuf>> {
    let Some(path) = log_path(cfg) else {
        return Ok(None);
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(&cfg.level))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init();

    tracing::info!(version = crate::VERSION, path = %path.display(), "logging started");
    Ok(Some(path))
}

fn log_path(cfg: &LogConfig) -> Option<PathBuf> {
    std::env::var(LOG_FILE_ENV)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
        .or_else(|| cfg.file.clone())
}

/// `RUST_LOG` wins over the configured level; a bad level falls back to info.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.trim()))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_file_means_no_subscriber() {
        if std::env::var(LOG_FILE_ENV).is_ok() {
            return;
        }
        let cfg = LogConfig::default();
        assert_eq!(init(&cfg).unwrap(), None);
    }

    #[test]
    fn configured_file_is_created() {
        if std::env::var(LOG_FILE_ENV).is_ok() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reelfeed.log");
        let cfg = LogConfig {
            file: Some(path.clone()),
            level: "debug".into(),
        };
        assert_eq!(init(&cfg).unwrap(), Some(path.clone()));
        assert!(path.exists());
    }
}
