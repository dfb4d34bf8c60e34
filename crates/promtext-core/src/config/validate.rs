//! Field-level checks for metric definitions.

use std::collections::BTreeMap;

use regex::Regex;

use super::{CollectorConfig, CollectorKind, MAPPING_DEFAULT_KEY, MetricConfig, ParseConfig};
use crate::collector::ValueType;

/// Returns `true` if `name` matches `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Returns `true` if `name` matches `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(super) fn validate_metric(metric: &MetricConfig) -> Result<(), String> {
    if metric.name.is_empty() {
        return Err("metric name is required".to_string());
    }
    if !is_valid_metric_name(&metric.name) {
        return Err(format!("invalid metric name '{}'", metric.name));
    }
    validate_collector(&metric.collector)
}

fn validate_collector(collector: &CollectorConfig) -> Result<(), String> {
    if collector.command.is_empty() {
        return Err("collector command is required".to_string());
    }

    if let Some(label) = collector.labels.keys().find(|k| !is_valid_label_name(k)) {
        return Err(format!("invalid label name '{}'", label));
    }

    match CollectorKind::parse(&collector.kind) {
        Some(CollectorKind::ExitCode) => Ok(()),
        Some(CollectorKind::ExitCodeMapping) => validate_mapping(collector),
        Some(CollectorKind::OutputParse) => match &collector.parse {
            Some(parse) => validate_parse(parse),
            None => Err("parse configuration is required".to_string()),
        },
        None => Err(format!("unknown collector type: {}", collector.kind)),
    }
}

/// Adds the mapping checks that collector construction would otherwise
/// report for that one metric at run time.
pub(super) fn validate_metric_strict(metric: &MetricConfig) -> Result<(), String> {
    validate_metric(metric)?;
    match (
        CollectorKind::parse(&metric.collector.kind),
        &metric.collector.mapping,
    ) {
        (Some(CollectorKind::ExitCodeMapping), Some(mapping)) => validate_mapping_entries(mapping),
        _ => Ok(()),
    }
}

fn validate_mapping(collector: &CollectorConfig) -> Result<(), String> {
    match &collector.mapping {
        Some(m) if !m.is_empty() => Ok(()),
        _ => Err("exit_code_mapping requires a mapping configuration".to_string()),
    }
}

fn validate_mapping_entries(mapping: &BTreeMap<String, f64>) -> Result<(), String> {
    if !mapping.contains_key(MAPPING_DEFAULT_KEY) {
        return Err("exit_code_mapping requires a default value".to_string());
    }
    for key in mapping.keys().filter(|k| k.as_str() != MAPPING_DEFAULT_KEY) {
        if key.parse::<i32>().is_err() {
            return Err(format!("invalid exit code in mapping: {}", key));
        }
    }
    Ok(())
}

fn validate_parse(parse: &ParseConfig) -> Result<(), String> {
    if parse.pattern.is_empty() {
        return Err("parse pattern is required".to_string());
    }
    Regex::new(&parse.pattern)
        .map_err(|e| format!("invalid regular expression pattern: {}", e))?;
    if let Some(value_type) = &parse.value_type {
        ValueType::parse(value_type)
            .ok_or_else(|| format!("unsupported value type: {}", value_type))?;
    }
    Ok(())
}
