//! Exit code passthrough: the metric value is the command's exit code.

use std::time::Duration;

use super::{CollectError, CollectResult, MetricTemplate};
use crate::executor::run_command;

/// Reports the exit code as the value, whatever happened.
///
/// Timeouts and launch failures still produce a metric (124 and 127), with
/// the failure attached as a warning.
#[derive(Debug)]
pub struct ExitCodeCollector {
    template: MetricTemplate,
    timeout: Duration,
}

impl ExitCodeCollector {
    pub(crate) fn new(template: MetricTemplate, timeout: Duration) -> Self {
        Self { template, timeout }
    }

    pub fn collect(&self) -> CollectResult {
        let result = run_command(&self.template.command, self.timeout);
        let metric = self.template.metric(f64::from(result.exit_code));

        match result.error {
            None => CollectResult::valid(metric),
            Some(e) => CollectResult::with_warning(metric, CollectError::Execution(e)),
        }
    }
}
