//! Template engine error taxonomy.
//!
//! Missing-data failures (undeclared variable, no such key) are transient
//! from the caller's point of view: a later reconcile may succeed once the
//! data appears. Syntax and type failures are permanent until the template
//! or schema changes.

use thiserror::Error;

/// Failure from compiling or evaluating a template expression.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The expression text does not parse.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The expression is well-formed but operates on the wrong types, or
    /// calls an unknown function.
    #[error("type error: {0}")]
    Type(String),

    /// The expression references data that is not (yet) present.
    #[error("missing data: {0}")]
    MissingData(String),
}

impl EngineError {
    /// Whether this failure may resolve itself once more data exists.
    /// Upstream callers treat only these as transient.
    pub fn is_missing_data(&self) -> bool {
        matches!(self, Self::MissingData(_))
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
