//! Exit code to value lookup with a mandatory fallback.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::{BuildError, CollectError, CollectResult, MetricTemplate};
use crate::config::MAPPING_DEFAULT_KEY;
use crate::executor::run_command;

/// Maps the exit code through a table; unmapped codes get the default.
///
/// Like [`super::ExitCodeCollector`], this always produces a metric.
#[derive(Debug)]
pub struct ExitCodeMappingCollector {
    template: MetricTemplate,
    mapping: HashMap<i32, f64>,
    default_value: f64,
    timeout: Duration,
}

impl ExitCodeMappingCollector {
    /// Parses the string-keyed mapping; every key other than `default`
    /// must be an integer exit code, and `default` must be present.
    pub(crate) fn new(
        template: MetricTemplate,
        raw: &BTreeMap<String, f64>,
        timeout: Duration,
    ) -> Result<Self, BuildError> {
        let mut mapping = HashMap::with_capacity(raw.len());
        let mut default_value = None;

        for (key, &value) in raw {
            if key == MAPPING_DEFAULT_KEY {
                default_value = Some(value);
                continue;
            }
            let code = key
                .parse::<i32>()
                .map_err(|_| BuildError::InvalidMappingKey(key.clone()))?;
            mapping.insert(code, value);
        }

        Ok(Self {
            template,
            mapping,
            default_value: default_value.ok_or(BuildError::MissingDefault)?,
            timeout,
        })
    }

    /// Value reported for `exit_code`.
    pub fn map_exit_code(&self, exit_code: i32) -> f64 {
        self.mapping
            .get(&exit_code)
            .copied()
            .unwrap_or(self.default_value)
    }

    pub fn collect(&self) -> CollectResult {
        let result = run_command(&self.template.command, self.timeout);
        let metric = self.template.metric(self.map_exit_code(result.exit_code));

        match result.error {
            None => CollectResult::valid(metric),
            Some(e) => CollectResult::with_warning(metric, CollectError::Execution(e)),
        }
    }
}
