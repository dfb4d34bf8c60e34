//! Command-driven metric collection.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        Collector                          │
//! │          (iterates definitions, classifies results)       │
//! └─────────────────────────────┬─────────────────────────────┘
//!                               │ MetricCollector::new / collect
//!        ┌──────────────────────┼───────────────────────┐
//!        │                      │                       │
//! ┌──────▼────────┐  ┌──────────▼──────────┐  ┌─────────▼─────────┐
//! │ ExitCode      │  │ ExitCodeMapping     │  │ OutputParse       │
//! │ value = code  │  │ code -> value       │  │ regex -> value    │
//! └──────┬────────┘  └──────────┬──────────┘  └─────────┬─────────┘
//!        │                      │                       │
//!        │                      │             ┌─────────▼─────────┐
//!        │                      │             │  ValueExtractor   │
//!        │                      │             └─────────┬─────────┘
//!        └──────────────────────┼───────────────────────┘
//!                        ┌──────▼──────┐
//!                        │ run_command │ (executor)
//!                        └─────────────┘
//! ```
//!
//! Every strategy returns a [`CollectResult`]. Only output parsing can
//! produce no metric at all; the exit-code strategies always report a value
//! and attach the execution failure as a warning.

#[allow(clippy::module_inception)]
mod collector;
mod exit_code;
mod exit_code_mapping;
mod extract;
mod output_parse;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::config::{CollectorKind, MetricConfig, MetricType};
use crate::executor::ExecError;

pub use collector::{CollectionReport, Collector};
pub use exit_code::ExitCodeCollector;
pub use exit_code_mapping::ExitCodeMappingCollector;
pub use extract::{ExtractError, ValueExtractor, ValueType, convert_value, extract_value};
pub use output_parse::OutputParseCollector;

/// A collected sample, ready for exposition.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub metric_type: MetricType,
    pub help: String,
    pub labels: BTreeMap<String, String>,
}

/// Everything about a metric except its value.
#[derive(Debug, Clone)]
pub(crate) struct MetricTemplate {
    pub name: String,
    pub metric_type: MetricType,
    pub help: String,
    pub labels: BTreeMap<String, String>,
    pub command: String,
}

impl MetricTemplate {
    fn from_config(config: &MetricConfig) -> Self {
        Self {
            name: config.name.clone(),
            metric_type: config.metric_type,
            help: config.help.clone(),
            labels: config.collector.labels.clone(),
            command: config.collector.command.clone(),
        }
    }

    fn metric(&self, value: f64) -> Metric {
        Metric {
            name: self.name.clone(),
            value,
            metric_type: self.metric_type,
            help: self.help.clone(),
            labels: self.labels.clone(),
        }
    }
}

/// Why a collector produced no value, or produced one with a warning.
#[derive(Debug)]
pub enum CollectError {
    /// The command failed, timed out or could not be launched.
    Execution(ExecError),
    /// The command succeeded but printed nothing.
    EmptyOutput,
    /// No number could be extracted from the output.
    Extract(ExtractError),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectError::Execution(e) => write!(f, "command execution failed: {}", e),
            CollectError::EmptyOutput => write!(f, "empty command output"),
            CollectError::Extract(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Execution(e) => Some(e),
            CollectError::EmptyOutput => None,
            CollectError::Extract(e) => Some(e),
        }
    }
}

impl From<ExecError> for CollectError {
    fn from(e: ExecError) -> Self {
        CollectError::Execution(e)
    }
}

impl From<ExtractError> for CollectError {
    fn from(e: ExtractError) -> Self {
        CollectError::Extract(e)
    }
}

/// Result of one `collect()` call.
///
/// | metric | cause | meaning                           |
/// |--------|-------|-----------------------------------|
/// | Some   | None  | clean value                       |
/// | Some   | Some  | value emitted with a warning      |
/// | None   | Some  | metric dropped for this run       |
#[derive(Debug)]
pub struct CollectResult {
    pub metric: Option<Metric>,
    pub cause: Option<CollectError>,
    /// The configured default replaced a value that could not be collected.
    pub used_default: bool,
}

impl CollectResult {
    fn valid(metric: Metric) -> Self {
        Self {
            metric: Some(metric),
            cause: None,
            used_default: false,
        }
    }

    fn with_warning(metric: Metric, cause: CollectError) -> Self {
        Self {
            metric: Some(metric),
            cause: Some(cause),
            used_default: false,
        }
    }

    fn defaulted(metric: Metric, cause: CollectError) -> Self {
        Self {
            metric: Some(metric),
            cause: Some(cause),
            used_default: true,
        }
    }

    fn failed(cause: CollectError) -> Self {
        Self {
            metric: None,
            cause: Some(cause),
            used_default: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.metric.is_some()
    }

    pub fn has_warning(&self) -> bool {
        self.metric.is_some() && self.cause.is_some()
    }
}

/// Configuration shape problems found while building a collector.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    UnknownKind(String),
    MissingMapping,
    MissingDefault,
    InvalidMappingKey(String),
    MissingParse,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnknownKind(kind) => write!(f, "unknown collector type: {}", kind),
            BuildError::MissingMapping => {
                write!(f, "exit_code_mapping collector requires mapping configuration")
            }
            BuildError::MissingDefault => write!(f, "exit_code_mapping requires a default value"),
            BuildError::InvalidMappingKey(key) => write!(f, "invalid exit code in mapping: {}", key),
            BuildError::MissingParse => {
                write!(f, "output_parse collector requires parse configuration")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// One of the three collector strategies, selected by the configured kind.
#[derive(Debug)]
pub enum MetricCollector {
    ExitCode(ExitCodeCollector),
    ExitCodeMapping(ExitCodeMappingCollector),
    OutputParse(OutputParseCollector),
}

impl MetricCollector {
    /// Builds the strategy for `config`, checking only the shape it needs.
    pub fn new(config: &MetricConfig, timeout: Duration) -> Result<Self, BuildError> {
        let template = MetricTemplate::from_config(config);
        let collector = &config.collector;

        match CollectorKind::parse(&collector.kind) {
            Some(CollectorKind::ExitCode) => Ok(MetricCollector::ExitCode(
                ExitCodeCollector::new(template, timeout),
            )),
            Some(CollectorKind::ExitCodeMapping) => {
                let mapping = collector.mapping.as_ref().ok_or(BuildError::MissingMapping)?;
                Ok(MetricCollector::ExitCodeMapping(
                    ExitCodeMappingCollector::new(template, mapping, timeout)?,
                ))
            }
            Some(CollectorKind::OutputParse) => {
                let parse = collector.parse.as_ref().ok_or(BuildError::MissingParse)?;
                Ok(MetricCollector::OutputParse(OutputParseCollector::new(
                    template, parse, timeout,
                )))
            }
            None => Err(BuildError::UnknownKind(collector.kind.clone())),
        }
    }

    pub fn kind(&self) -> CollectorKind {
        match self {
            MetricCollector::ExitCode(_) => CollectorKind::ExitCode,
            MetricCollector::ExitCodeMapping(_) => CollectorKind::ExitCodeMapping,
            MetricCollector::OutputParse(_) => CollectorKind::OutputParse,
        }
    }

    /// Runs the command and derives the metric value.
    pub fn collect(&self) -> CollectResult {
        match self {
            MetricCollector::ExitCode(c) => c.collect(),
            MetricCollector::ExitCodeMapping(c) => c.collect(),
            MetricCollector::OutputParse(c) => c.collect(),
        }
    }
}
