// Small helpers shared by the pipeline steps: logging setup, banners,
// pacing and filesystem access that reports the problematic path.
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{Error, Result};

const HEADER_WIDTH: usize = 60;

/// Installs the fmt subscriber, `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    let filter =
        EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy();
    // A second installation (e.g. from tests) is not an error worth surfacing.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Logs a framed section title.
pub fn header(title: &str) {
    let rule = "=".repeat(HEADER_WIDTH);
    info!("{rule}");
    info!("{:^width$}", title, width = HEADER_WIDTH);
    info!("{rule}");
}

/// Sleeps for `seconds` scaled by the configured pacing factor. Durations
/// too large to represent are skipped.
pub fn pause(config: &Config, seconds: f64) {
    let scaled = seconds * config.pacing;
    if scaled > 0. {
        match Duration::try_from_secs_f64(scaled) {
            Ok(duration) => std::thread::sleep(duration),
            Err(err) => warn!("skipping pause of {scaled}s: {err}"),
        }
    }
}

pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    std::fs::create_dir_all(path.as_ref()).map_err(|e| Error::io(path.as_ref(), e))
}

// A simple wrapper around File::open adding details about the
// problematic file.
pub fn file_open<P: AsRef<Path>>(path: P) -> Result<std::fs::File> {
    std::fs::File::open(path.as_ref()).map_err(|e| Error::io(path.as_ref(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_open_reports_path() {
        let err = file_open("does/not/exist.txt").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.txt"));
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn pause_disabled_returns_immediately() {
        let config = Config { pacing: 0., ..Config::default() };
        let start = std::time::Instant::now();
        pause(&config, 5.);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn pause_skips_unrepresentable_durations() {
        let config = Config { pacing: 1e300, ..Config::default() };
        config.validate().unwrap();
        let start = std::time::Instant::now();
        pause(&config, 0.5);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
