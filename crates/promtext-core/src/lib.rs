//! promtext-core: shared library for the promtext exporter.
//!
//! Provides:
//! - `config`: YAML metric definitions, loading and validation
//! - `executor`: shell command runner with deadline and process-group kill
//! - `collector`: collector strategies, value extraction, orchestration
//! - `exposition`: text exposition formatting and atomic file writes
//! - `exporter`: one-shot run: collect, check, write

pub mod collector;
pub mod config;
pub mod executor;
pub mod exporter;
pub mod exposition;
