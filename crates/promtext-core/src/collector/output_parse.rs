//! Value parsed out of command output.

use std::time::Duration;

use super::{CollectError, CollectResult, ExtractError, MetricTemplate, ValueExtractor};
use crate::config::ParseConfig;
use crate::executor::run_command;

/// Runs the command and extracts the value with a regex.
///
/// The only strategy that can drop a metric. Each failure stage (command
/// failed, empty output, bad pattern, no match, conversion error) falls
/// back to `default_value` with a warning when one is configured.
#[derive(Debug)]
pub struct OutputParseCollector {
    template: MetricTemplate,
    /// Compiled once; a bad pattern surfaces on `collect`.
    extractor: Result<ValueExtractor, ExtractError>,
    default_value: Option<f64>,
    timeout: Duration,
}

impl OutputParseCollector {
    pub(crate) fn new(template: MetricTemplate, parse: &ParseConfig, timeout: Duration) -> Self {
        Self {
            template,
            extractor: ValueExtractor::new(parse),
            default_value: parse.default_value,
            timeout,
        }
    }

    pub fn collect(&self) -> CollectResult {
        let result = run_command(&self.template.command, self.timeout);

        if let Some(e) = result.error {
            return self.fallback(CollectError::Execution(e));
        }
        if result.output.is_empty() {
            return self.fallback(CollectError::EmptyOutput);
        }

        let extracted = match &self.extractor {
            Ok(extractor) => extractor.extract(&result.output),
            Err(e) => Err(e.clone()),
        };
        match extracted {
            Ok(value) => CollectResult::valid(self.template.metric(value)),
            Err(e) => self.fallback(CollectError::Extract(e)),
        }
    }

    fn fallback(&self, cause: CollectError) -> CollectResult {
        match self.default_value {
            Some(value) => CollectResult::defaulted(self.template.metric(value), cause),
            None => CollectResult::failed(cause),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::collector::test_support::{metric_config, parse_config};

    fn collector(command: &str, parse: ParseConfig) -> OutputParseCollector {
        collector_with_timeout(command, parse, Duration::from_secs(10))
    }

    fn collector_with_timeout(
        command: &str,
        parse: ParseConfig,
        timeout: Duration,
    ) -> OutputParseCollector {
        let config = metric_config("output_parse", command);
        OutputParseCollector::new(MetricTemplate::from_config(&config), &parse, timeout)
    }

    fn with_default(mut parse: ParseConfig, value: f64) -> ParseConfig {
        parse.default_value = Some(value);
        parse
    }

    #[test]
    fn test_parse_with_multiplier() {
        let mut parse = parse_config(r"value=(\d+)", 1);
        parse.multiplier = Some(2.0);
        let result = collector("echo value=21", parse).collect();
        assert!(result.is_valid());
        assert!(!result.has_warning());
        assert_eq!(result.metric.unwrap().value, 42.0);
    }

    #[test]
    fn test_reads_stderr_too() {
        let parse = parse_config(r"errors=(\d+)", 1);
        let result = collector("echo errors=4 1>&2", parse).collect();
        assert_eq!(result.metric.unwrap().value, 4.0);
    }

    #[test]
    fn test_string_map() {
        let mut parse = parse_config(r"^(\w+)", 1);
        parse.string_map = Some(BTreeMap::from([
            ("up".to_string(), 1.0),
            ("down".to_string(), 0.0),
        ]));

        let result = collector("echo up", parse.clone()).collect();
        assert!(!result.has_warning());
        assert_eq!(result.metric.unwrap().value, 1.0);

        let result = collector("echo sideways", with_default(parse.clone(), 0.0)).collect();
        assert!(result.has_warning());
        assert!(result.used_default);
        assert_eq!(result.metric.unwrap().value, 0.0);

        let result = collector("echo sideways", parse).collect();
        assert!(!result.is_valid());
        assert!(matches!(
            result.cause,
            Some(CollectError::Extract(ExtractError::UnmappedValue(_)))
        ));
    }

    #[test]
    fn test_command_failure() {
        let parse = parse_config(r"(\d+)", 1);

        let result = collector("echo 5; exit 1", parse.clone()).collect();
        assert!(!result.is_valid());
        assert!(matches!(result.cause, Some(CollectError::Execution(_))));

        let result = collector("echo 5; exit 1", with_default(parse, -1.0)).collect();
        assert!(result.used_default);
        assert_eq!(result.metric.unwrap().value, -1.0);
    }

    #[test]
    fn test_timeout_uses_default() {
        let parse = with_default(parse_config(r"(\d+)", 1), 0.0);
        let result = collector_with_timeout("sleep 30", parse, Duration::from_millis(200)).collect();
        assert!(result.used_default);
        assert!(result.cause.unwrap().to_string().contains("timed out"));
    }

    #[test]
    fn test_empty_output() {
        let parse = parse_config(r"(\d+)", 1);

        let result = collector("true", parse.clone()).collect();
        assert!(matches!(result.cause, Some(CollectError::EmptyOutput)));
        assert!(result.metric.is_none());

        let result = collector("true", with_default(parse, 3.0)).collect();
        assert!(result.has_warning());
        assert_eq!(result.metric.unwrap().value, 3.0);
    }

    #[test]
    fn test_invalid_pattern() {
        let parse = parse_config(r"(\d+", 1);

        let result = collector("echo 1", parse.clone()).collect();
        assert!(matches!(
            result.cause,
            Some(CollectError::Extract(ExtractError::InvalidPattern(_)))
        ));

        let result = collector("echo 1", with_default(parse, 9.0)).collect();
        assert!(result.used_default);
        assert_eq!(result.metric.unwrap().value, 9.0);
    }

    #[test]
    fn test_no_match() {
        let parse = parse_config(r"value=(\d+)", 1);

        let result = collector("echo nothing", parse.clone()).collect();
        assert!(matches!(
            result.cause,
            Some(CollectError::Extract(ExtractError::NoMatch { .. }))
        ));

        let result = collector("echo nothing", with_default(parse, 0.0)).collect();
        assert!(result.used_default);
    }

    #[test]
    fn test_conversion_failure() {
        let mut parse = parse_config(r"value=(\S+)", 1);
        parse.value_type = Some("int".to_string());

        let result = collector("echo value=abc", parse.clone()).collect();
        assert!(matches!(
            result.cause,
            Some(CollectError::Extract(ExtractError::InvalidValue { .. }))
        ));

        let result = collector("echo value=abc", with_default(parse, 5.0)).collect();
        assert!(result.used_default);
        assert_eq!(result.metric.unwrap().value, 5.0);
    }

    #[test]
    fn test_default_is_not_multiplied() {
        let mut parse = with_default(parse_config(r"value=(\d+)", 1), 4.0);
        parse.multiplier = Some(10.0);
        let result = collector("echo other", parse).collect();
        assert_eq!(result.metric.unwrap().value, 4.0);
    }
}
