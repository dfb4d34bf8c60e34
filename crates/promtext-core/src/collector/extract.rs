//! Turns command output into a number.
//!
//! Steps, in order: regex match, capture group selection, string-map lookup
//! or type conversion, multiplier. Any failing step yields an
//! [`ExtractError`]; substituting a default is left to the caller.

use std::fmt;

use regex::Regex;

use crate::config::ParseConfig;

/// Declared type of the captured text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Float,
    Int,
    /// `true`/`false` literals (also `1`, `t`, `TRUE`, ...).
    Bool,
    /// Integer; any non-zero value is 1.
    BoolNonzero,
}

impl ValueType {
    /// Resolves a configured type name; the empty string means `float`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "" | "float" => Some(ValueType::Float),
            "int" => Some(ValueType::Int),
            "bool" => Some(ValueType::Bool),
            "bool_nonzero" => Some(ValueType::BoolNonzero),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Float => "float",
            ValueType::Int => "int",
            ValueType::Bool => "bool",
            ValueType::BoolNonzero => "bool_nonzero",
        }
    }

    fn convert(self, text: &str) -> Result<f64, ExtractError> {
        let invalid = |reason: String| ExtractError::InvalidValue {
            value_type: self,
            text: text.to_string(),
            reason,
        };

        match self {
            ValueType::Float => text.parse::<f64>().map_err(|e| invalid(e.to_string())),
            ValueType::Int => text
                .parse::<i64>()
                .map(|v| v as f64)
                .map_err(|e| invalid(e.to_string())),
            ValueType::Bool => parse_bool(text)
                .map(|b| if b { 1.0 } else { 0.0 })
                .ok_or_else(|| invalid("not a boolean literal".to_string())),
            ValueType::BoolNonzero => text
                .parse::<i64>()
                .map(|v| if v != 0 { 1.0 } else { 0.0 })
                .map_err(|e| invalid(e.to_string())),
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Why no value could be extracted.
#[derive(Debug, Clone)]
pub enum ExtractError {
    InvalidPattern(regex::Error),
    /// No match, or the capture group index exceeds the groups captured.
    NoMatch { index: usize },
    /// A string map is configured and the captured text is not in it.
    UnmappedValue(String),
    InvalidValue {
        value_type: ValueType,
        text: String,
        reason: String,
    },
    UnsupportedValueType(String),
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractError::InvalidPattern(e) => write!(f, "invalid regex pattern: {}", e),
            ExtractError::NoMatch { index } => {
                write!(f, "pattern didn't match or index {} out of range", index)
            }
            ExtractError::UnmappedValue(text) => {
                write!(f, "string '{}' not found in mapping", text)
            }
            ExtractError::InvalidValue {
                value_type,
                text,
                reason,
            } => write!(
                f,
                "could not parse {} value from '{}': {}",
                value_type.as_str(),
                text,
                reason
            ),
            ExtractError::UnsupportedValueType(name) => {
                write!(f, "unsupported value type: {}", name)
            }
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::InvalidPattern(e) => Some(e),
            _ => None,
        }
    }
}

/// A parse specification with its pattern compiled.
#[derive(Debug, Clone)]
pub struct ValueExtractor {
    regex: Regex,
    parse: ParseConfig,
}

impl ValueExtractor {
    /// Compiles the pattern; an invalid pattern is an error, never a panic.
    pub fn new(parse: &ParseConfig) -> Result<Self, ExtractError> {
        let regex = Regex::new(&parse.pattern).map_err(ExtractError::InvalidPattern)?;
        Ok(Self {
            regex,
            parse: parse.clone(),
        })
    }

    /// Extracts the configured capture group from the first match and
    /// converts it.
    pub fn extract(&self, text: &str) -> Result<f64, ExtractError> {
        let index = self.parse.index;
        let captures = self
            .regex
            .captures(text)
            .ok_or(ExtractError::NoMatch { index })?;
        if index >= captures.len() {
            return Err(ExtractError::NoMatch { index });
        }
        // A group that did not participate in the match reads as "".
        let captured = captures.get(index).map_or("", |m| m.as_str());
        convert_value(captured, &self.parse)
    }
}

/// Compiles `parse.pattern` and extracts a value from `text` in one step.
pub fn extract_value(text: &str, parse: &ParseConfig) -> Result<f64, ExtractError> {
    ValueExtractor::new(parse)?.extract(text)
}

/// Converts captured text per the string map or value type, then applies
/// the multiplier.
pub fn convert_value(text: &str, parse: &ParseConfig) -> Result<f64, ExtractError> {
    let value = match parse.string_map.as_ref().filter(|m| !m.is_empty()) {
        Some(map) => *map
            .get(text)
            .ok_or_else(|| ExtractError::UnmappedValue(text.to_string()))?,
        None => {
            let name = parse.value_type.as_deref().unwrap_or("");
            let value_type = ValueType::parse(name)
                .ok_or_else(|| ExtractError::UnsupportedValueType(name.to_string()))?;
            value_type.convert(text)?
        }
    };

    Ok(apply_multiplier(value, parse.multiplier))
}

/// A multiplier of zero counts as unset: the value passes through unchanged.
/// There is no way to scale every value to zero through this field.
fn apply_multiplier(value: f64, multiplier: Option<f64>) -> f64 {
    match multiplier {
        Some(m) if m != 0.0 => value * m,
        _ => value,
    }
}
