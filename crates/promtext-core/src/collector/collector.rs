//! Runs every configured metric and assembles the result set.
//!
//! The `Collector` walks the metric definitions one at a time, builds the
//! matching strategy, and sorts each outcome into emitted metrics plus
//! run-level warning/error flags. A failing metric never aborts the run.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::{CollectResult, Metric, MetricCollector};
use crate::config::Config;

/// Metrics gathered by one run, plus aggregate health.
#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    pub metrics: Vec<Metric>,
    /// At least one metric was emitted with a warning attached.
    pub had_warnings: bool,
    /// At least one metric could not be built or collected.
    pub had_errors: bool,
    /// Wall time spent collecting.
    pub elapsed: Duration,
}

impl CollectionReport {
    /// Whether there is nothing to write; the run counts as failed.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Classifies one collector outcome.
    pub fn record(&mut self, key: &str, result: CollectResult) {
        match (result.metric, result.cause) {
            (Some(metric), None) => self.metrics.push(metric),
            (Some(metric), Some(cause)) => {
                if result.used_default {
                    warn!("Warning collecting metric {}: {} (using default value)", key, cause);
                } else {
                    warn!("Warning collecting metric {}: {}", key, cause);
                }
                self.had_warnings = true;
                self.metrics.push(metric);
            }
            (None, Some(cause)) => {
                error!("Error collecting metric {}: {}", key, cause);
                self.had_errors = true;
            }
            (None, None) => {
                error!("Error collecting metric {}: no value produced", key);
                self.had_errors = true;
            }
        }
    }
}

/// Sequential collection over a configuration.
///
/// Holds no state between runs; build one per invocation.
#[derive(Debug, Clone)]
pub struct Collector {
    timeout: Duration,
}

impl Collector {
    /// Creates a collector with a per-command `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Collects every metric in `config`.
    ///
    /// Construction failures and dropped metrics set `had_errors`; nothing
    /// is retried within a run.
    pub fn collect(&self, config: &Config) -> CollectionReport {
        let started = Instant::now();
        let mut report = CollectionReport::default();

        for (key, metric_config) in &config.metrics {
            info!("Collecting metric: {}", key);

            let collector = match MetricCollector::new(metric_config, self.timeout) {
                Ok(c) => c,
                Err(e) => {
                    error!("Error creating collector for {}: {}", key, e);
                    report.had_errors = true;
                    continue;
                }
            };

            let metric_started = Instant::now();
            let result = collector.collect();
            debug!(
                "Metric {} ({:?}) collected in {:?}",
                key,
                collector.kind(),
                metric_started.elapsed()
            );

            report.record(key, result);
        }

        report.elapsed = started.elapsed();
        debug!(
            "Collection finished in {:?}: {} metrics, warnings={}, errors={}",
            report.elapsed,
            report.metrics.len(),
            report.had_warnings,
            report.had_errors
        );
        report
    }
}
