//! Error types for the cvdsim_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cvdsim_core operations
///
/// Missing entity attributes are never reported through this type: a rule
/// whose preconditions are not met simply does nothing for that day.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A lookup landed outside the populated domain of a risk table
    #[error("Risk table domain error: {0}")]
    TableDomain(String),

    /// A probability outside [0, 1] reached a draw or a conversion
    #[error("Probability out of range: {0}")]
    Probability(String),

    /// Write would break a write-once or monotone entity attribute
    #[error("Attribute error: {0}")]
    Attribute(String),

    /// Rule graph could not be ordered (cycle, duplicate rule name)
    #[error("Rule graph error: {0}")]
    RuleGraph(String),

    /// Append to an entity's event log would break its ordering guarantees
    #[error("Event log error: {0}")]
    EventLog(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
