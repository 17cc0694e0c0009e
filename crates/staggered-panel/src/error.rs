//! Error types for panel construction and loading.

use thiserror::Error;

/// Result type for panel operations.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Errors that can occur while building or loading a panel.
#[derive(Debug, Error)]
pub enum PanelError {
    /// A bound column is missing from the input table
    #[error("Schema error: required column '{column}' not found")]
    Schema {
        /// Name of the missing column
        column: String,
    },

    /// The same (unit, time) pair appears more than once
    #[error("Duplicate key: unit '{unit}' has more than one row at time {time}")]
    DuplicateKey {
        /// Offending unit
        unit: String,
        /// Offending period
        time: i64,
    },

    /// The never-treated sentinel collides with a genuine adoption period
    #[error(
        "Sentinel ambiguity: never-treated value {sentinel} is an observed period after the first period {first_period}"
    )]
    SentinelAmbiguity {
        /// Configured never-treated value
        sentinel: i64,
        /// Earliest period in the panel
        first_period: i64,
    },

    /// `first_treat` varies within a unit
    #[error("Inconsistent cohort: unit '{unit}' has first_treat values {first} and {second}")]
    InconsistentCohort {
        /// Offending unit
        unit: String,
        /// First value seen
        first: i64,
        /// Conflicting value
        second: i64,
    },

    /// The cluster key varies within a unit
    #[error("Inconsistent cluster: unit '{unit}' belongs to clusters '{first}' and '{second}'")]
    InconsistentCluster {
        /// Offending unit
        unit: String,
        /// First cluster seen
        first: String,
        /// Conflicting cluster
        second: String,
    },

    /// `first_treat` is neither the sentinel nor an observed period
    #[error("Unknown cohort: unit '{unit}' has first_treat {first_treat}, which is not a panel period")]
    UnknownCohort {
        /// Offending unit
        unit: String,
        /// Its adoption period
        first_treat: i64,
    },

    /// A key column holds a null
    #[error("Missing value in column '{column}' at row {row}")]
    MissingValue {
        /// Column holding the null
        column: String,
        /// Zero-based row index
        row: usize,
    },

    /// No usable rows remain
    #[error("Panel is empty after validation")]
    Empty,

    /// Date parsing error
    #[error("Cannot parse date '{value}': {source}")]
    DateParse {
        /// Raw text
        value: String,
        /// Parser error
        #[source]
        source: chrono::ParseError,
    },

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
