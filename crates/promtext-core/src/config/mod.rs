//! Metric definitions loaded from a YAML configuration file.
//!
//! The file holds a single `metrics` map. Each entry names one metric and
//! the collector that produces its value:
//!
//! ```yaml
//! metrics:
//!   backup_status:
//!     name: backup_last_exit_code
//!     type: gauge
//!     help: Exit code of the last backup check
//!     collector:
//!       type: exit_code
//!       command: /usr/local/bin/check_backup
//!       labels:
//!         job: nightly
//! ```
//!
//! Loading decodes the file and checks the shape every metric needs. Mapping
//! contents (the `default` key, integer exit codes) are left to collector
//! construction, so one bad mapping only loses that metric.
//! [`Config::validate_strict`] checks them up front as well.

mod validate;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub use validate::{is_valid_label_name, is_valid_metric_name};

/// Top-level configuration: metric definitions keyed by their YAML key.
///
/// A `BTreeMap` keeps iteration stable between runs; callers must not
/// depend on any particular order beyond that.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricConfig>,
}

/// One metric definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub help: String,
    pub collector: CollectorConfig,
}

/// Exposition type of a metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    #[default]
    Gauge,
    Counter,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collector specification as written in the file.
///
/// `kind` stays a plain string here: an unknown kind is a construction
/// error for that one metric, not a decode error for the whole file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectorConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Exit code (as string) to value, plus the mandatory `default` key.
    #[serde(default)]
    pub mapping: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub parse: Option<ParseConfig>,
}

/// Key in an exit-code mapping that holds the fallback value.
pub const MAPPING_DEFAULT_KEY: &str = "default";

/// Known collector kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorKind {
    ExitCode,
    ExitCodeMapping,
    OutputParse,
}

impl CollectorKind {
    /// Resolves a kind string, accepting the legacy `returncode` spellings.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "exit_code" | "returncode" => Some(CollectorKind::ExitCode),
            "exit_code_mapping" | "returncode_mapping" => Some(CollectorKind::ExitCodeMapping),
            "output_parse" => Some(CollectorKind::OutputParse),
            _ => None,
        }
    }
}

/// How to pull a number out of command output.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParseConfig {
    #[serde(default)]
    pub pattern: String,
    /// Capture group to read; 0 is the whole match.
    #[serde(default)]
    pub index: usize,
    /// `float` (default), `int`, `bool` or `bool_nonzero`.
    #[serde(default)]
    pub value_type: Option<String>,
    /// Verbatim text to value lookup; wins over `value_type` when non-empty.
    #[serde(default)]
    pub string_map: Option<BTreeMap<String, f64>>,
    /// Applied after conversion. Zero means "not configured", not "multiply by zero".
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub default_value: Option<f64>,
}

/// Errors that can occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid YAML for this schema.
    Parse(serde_yaml::Error),
    /// The `metrics` map is empty or missing.
    NoMetrics,
    /// A single metric definition is malformed.
    InvalidMetric { key: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "failed to parse config file: {}", e),
            ConfigError::NoMetrics => write!(f, "no metrics defined"),
            ConfigError::InvalidMetric { key, reason } => {
                write!(f, "invalid metric '{}': {}", key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl Config {
    /// Reads, decodes and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Decodes and validates configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every metric definition, stopping at the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        for (key, metric) in &self.metrics {
            validate::validate_metric(metric).map_err(|reason| ConfigError::InvalidMetric {
                key: key.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Like [`Config::validate`], but also rejects mappings that collector
    /// construction would refuse.
    pub fn validate_strict(&self) -> Result<(), ConfigError> {
        if self.metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        for (key, metric) in &self.metrics {
            validate::validate_metric_strict(metric).map_err(|reason| {
                ConfigError::InvalidMetric {
                    key: key.clone(),
                    reason,
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
metrics:
  backup:
    name: backup_exit_code
    type: gauge
    help: Exit code of the backup check
    collector:
      type: exit_code
      command: "true"
      labels:
        job: nightly
  service:
    name: service_up
    type: gauge
    collector:
      type: exit_code_mapping
      command: "systemctl is-active nginx"
      mapping:
        "0": 1
        "3": 0
        default: -1
  queue:
    name: queue_depth
    type: counter
    collector:
      type: output_parse
      command: "echo depth=12"
      parse:
        pattern: 'depth=(\d+)'
        index: 1
        value_type: int
        multiplier: 2
        default_value: 0
"#;

    #[test]
    fn test_load_sample_config() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.metrics.len(), 3);

        let backup = &config.metrics["backup"];
        assert_eq!(backup.name, "backup_exit_code");
        assert_eq!(backup.metric_type, MetricType::Gauge);
        assert_eq!(backup.collector.labels["job"], "nightly");

        let service = &config.metrics["service"];
        let mapping = service.collector.mapping.as_ref().unwrap();
        assert_eq!(mapping["0"], 1.0);
        assert_eq!(mapping[MAPPING_DEFAULT_KEY], -1.0);

        let queue = &config.metrics["queue"];
        assert_eq!(queue.metric_type, MetricType::Counter);
        assert_eq!(queue.help, "");
        let parse = queue.collector.parse.as_ref().unwrap();
        assert_eq!(parse.index, 1);
        assert_eq!(parse.value_type.as_deref(), Some("int"));
        assert_eq!(parse.multiplier, Some(2.0));
        assert_eq!(parse.default_value, Some(0.0));
    }

    #[test]
    fn test_example_config_is_valid() {
        let config =
            Config::from_yaml_str(include_str!("../../../../config.example.yaml")).unwrap();
        assert_eq!(config.metrics.len(), 4);
        let parse = config.metrics["replication"].collector.parse.as_ref().unwrap();
        assert_eq!(parse.string_map.as_ref().unwrap()["streaming"], 1.0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.metrics.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_empty_metrics_rejected() {
        let err = Config::from_yaml_str("metrics: {}\n").unwrap_err();
        assert!(matches!(err, ConfigError::NoMetrics));
    }

    #[test]
    fn test_unknown_metric_type_is_parse_error() {
        let yaml = r#"
metrics:
  m:
    name: m
    type: histogram
    collector:
      type: exit_code
      command: "true"
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_collector_kind_names_metric() {
        let yaml = r#"
metrics:
  disk:
    name: disk_check
    type: gauge
    collector:
      type: magic
      command: "true"
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("disk"), "{msg}");
        assert!(msg.contains("unknown collector type"), "{msg}");
    }

    #[test]
    fn test_mapping_without_default_loads() {
        let yaml = r#"
metrics:
  bad:
    name: service_up
    type: gauge
    collector:
      type: exit_code_mapping
      command: "true"
      mapping:
        "0": 1
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        let err = config.validate_strict().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bad"), "{msg}");
        assert!(msg.contains("default value"), "{msg}");
    }

    #[test]
    fn test_strict_accepts_sample() {
        Config::from_yaml_str(SAMPLE).unwrap().validate_strict().unwrap();
    }

    #[test]
    fn test_collector_kind_aliases() {
        assert_eq!(CollectorKind::parse("returncode"), Some(CollectorKind::ExitCode));
        assert_eq!(
            CollectorKind::parse("returncode_mapping"),
            Some(CollectorKind::ExitCodeMapping)
        );
        assert_eq!(CollectorKind::parse("output_parse"), Some(CollectorKind::OutputParse));
        assert_eq!(CollectorKind::parse("exitcode"), None);
    }
}
