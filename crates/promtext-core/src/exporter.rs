//! One-shot run: collect every metric, then write them out.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::collector::{CollectionReport, Collector};
use crate::config::Config;
use crate::exposition;

/// Where the formatted metrics go.
#[derive(Debug, Clone)]
pub enum Destination {
    /// Atomically replaced file; its directory is created if missing.
    File(PathBuf),
    Stdout,
}

/// Failures that abort the whole run.
#[derive(Debug)]
pub enum RunError {
    /// Every metric failed; there is nothing to write.
    NoMetrics,
    /// The output directory could not be created.
    CreateDir { path: PathBuf, source: io::Error },
    /// Writing the output failed.
    Write(io::Error),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::NoMetrics => write!(f, "no metrics were collected"),
            RunError::CreateDir { path, source } => write!(
                f,
                "failed to create output directory {}: {}",
                path.display(),
                source
            ),
            RunError::Write(e) => write!(f, "failed to write metrics: {}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::NoMetrics => None,
            RunError::CreateDir { source, .. } => Some(source),
            RunError::Write(e) => Some(e),
        }
    }
}

impl From<io::Error> for RunError {
    fn from(e: io::Error) -> Self {
        RunError::Write(e)
    }
}

/// Collects all metrics in `config` and writes them to `destination`.
///
/// Individual metric failures only show up in the report flags. The run
/// fails when nothing was collected or the output cannot be written.
pub fn run_once(
    config: &Config,
    timeout: Duration,
    destination: &Destination,
) -> Result<CollectionReport, RunError> {
    let report = Collector::new(timeout).collect(config);
    if report.is_empty() {
        return Err(RunError::NoMetrics);
    }

    match destination {
        Destination::File(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|source| RunError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
            exposition::write_metrics_to_file(&report.metrics, path)?;
            info!(
                "Successfully wrote {} metrics to {}",
                report.metrics.len(),
                path.display()
            );
        }
        Destination::Stdout => {
            exposition::write_metrics(&report.metrics, &mut io::stdout().lock())?;
        }
    }

    Ok(report)
}
