//! Error types for FlagVet
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for FlagVet operations
pub type Result<T> = std::result::Result<T, VetError>;

/// Main error type for FlagVet operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VetError {
    /// Interval or flag construction error
    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Trigger table data-contract violation
    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),

    /// Metric registration, lookup or invocation error
    #[error("Metric error: {0}")]
    Metric(#[from] MetricError),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors building intervals and flags
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentError {
    /// Interval bounds are reversed or not finite
    #[error("Invalid interval [{start}, {end})")]
    InvalidInterval { start: f64, end: f64 },

    /// Active segments extend beyond the known segments
    #[error("Flag {name:?} has active time outside its known segments")]
    ActiveOutsideKnown { name: String },
}

/// Errors reading trigger tables
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriggerError {
    /// A row lacks a column the operation requires
    #[error("Trigger row {index} has no column {column:?}")]
    MissingColumn { column: String, index: usize },
}

/// Errors in the metric framework
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    /// Name already taken in the registry
    #[error("A metric has already been registered as {name:?}")]
    DuplicateRegistration { name: String },

    /// Nothing registered or constructible under this name
    #[error("No metric registered with name {name:?}")]
    NotFound { name: String },

    /// Metric expression matched the grammar but could not be built
    #[error("Cannot parse metric expression {expression:?}: {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// Comparison operator outside the supported set
    #[error("Cannot parse operator {operator:?}, choose one of: <, <=, =, >=, >, ==, !=")]
    UnknownOperator { operator: String },

    /// Declared method is not in the method table
    #[error("Cannot resolve metric method {path:?}")]
    UnresolvedMethod { path: String },

    /// Metric names must be non-empty
    #[error("Invalid metric name {0:?}")]
    InvalidName(String),

    /// No name given and none derivable from the scoring function
    #[error("Cannot derive a metric name from an anonymous scoring function")]
    AnonymousMethod,

    /// Metric invoked without an input it requires
    #[error("Metric {metric:?} requires {input}")]
    MissingInput { metric: String, input: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VetError::Metric(MetricError::NotFound {
            name: "Efficency | snr >= 8".to_string(),
        });
        let msg = format!("{}", err);
        assert!(msg.contains("No metric registered"));
        assert!(msg.contains("Efficency | snr >= 8"));
    }

    #[test]
    fn test_error_conversion() {
        let trigger_err = TriggerError::MissingColumn {
            column: "peak".to_string(),
            index: 3,
        };
        let vet_err: VetError = trigger_err.into();
        assert!(matches!(vet_err, VetError::Trigger(_)));
        assert!(vet_err.to_string().contains("row 3"));
    }
}
