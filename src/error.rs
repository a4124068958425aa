use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::validation::ValidationReport;

/// The main error type for labelfuse operations.
#[derive(Debug, Error)]
pub enum LabelFuseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed record in {path} at {location}: {message}")]
    MalformedRecord {
        path: PathBuf,
        location: String,
        message: String,
    },

    #[error("Failed to write CSV to {path}: {source}")]
    CsvWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to parse sweep config YAML from {path}: {source}")]
    SweepConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write report JSON: {0}")]
    ReportJsonWrite(#[source] serde_json::Error),

    #[error("Invalid constraint syntax at {location}: {message}")]
    InvalidConstraintSyntax { location: String, message: String },

    #[error("Unsatisfiable constraint set: {0}")]
    UnsatisfiableConstraintSet(String),

    #[error("Insufficient evidence: {0}")]
    InsufficientEvidence(String),

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },

    #[error("Unknown integration strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid hyperparameters for {strategy}: {message}")]
    InvalidHyperparameters { strategy: String, message: String },

    #[error("Invalid transport option: {0}")]
    InvalidTransportOption(String),

    #[error("Computation limit exceeded: {0}")]
    ComputationLimitExceeded(String),

    #[error("External computation failed ({status}) for command: {command}")]
    ExternalComputationFailed { command: String, status: String },

    #[error("External computation timed out after {timeout:?} for command: {command}")]
    ExternalComputationTimeout { command: String, timeout: Duration },

    #[error("Failed to clean up {path}: {source}")]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Computation was cancelled")]
    Cancelled,

    #[error("Metric alignment failed: {0}")]
    MetricAlignment(String),
}
