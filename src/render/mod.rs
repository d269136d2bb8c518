//! The rendering pipeline: from component spec + type + traits +
//! overrides to a deterministic set of target-cluster resources.

mod expand;
mod layers;
mod pipeline;
mod snapshot;

pub use expand::{RenderedResource, DEFAULT_TARGET_PLANE};
pub use layers::merge_layers;
pub use pipeline::{render, RenderOutput, RenderRequest};
pub use snapshot::{
    cut_env_snapshot, cut_release, release_fingerprint, request_from_release,
};

use thiserror::Error;

use crate::domain::errors::ReconcileError;
use crate::engine::EngineError;
use crate::schema::SchemaError;

/// Failure from the rendering pipeline.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Schema parse or validation failures, path-qualified.
    #[error("invalid input: {}", .0.first().map(ToString::to_string).unwrap_or_default())]
    Schema(Vec<SchemaError>),

    /// Expression compile or evaluation failure.
    #[error("expression failed: {0}")]
    Expression(#[from] EngineError),

    /// Disjointness violations, failed validation rules, malformed
    /// templates.
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl From<SchemaError> for RenderError {
    fn from(err: SchemaError) -> Self {
        Self::Schema(vec![err])
    }
}

impl From<Vec<SchemaError>> for RenderError {
    fn from(errors: Vec<SchemaError>) -> Self {
        Self::Schema(errors)
    }
}

impl From<RenderError> for ReconcileError {
    fn from(err: RenderError) -> Self {
        match err {
            // Missing data may appear later; everything else waits for a
            // spec change.
            RenderError::Expression(inner) if inner.is_missing_data() => {
                ReconcileError::Transient(inner.to_string())
            }
            other => ReconcileError::InvalidInput(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_data_maps_to_transient() {
        let err: ReconcileError =
            RenderError::Expression(EngineError::MissingData("no such key: x".into())).into();
        assert!(matches!(err, ReconcileError::Transient(_)));
    }

    #[test]
    fn test_schema_errors_map_to_invalid_input() {
        let err: ReconcileError =
            RenderError::Schema(vec![SchemaError::new("parameters.x", "bad")]).into();
        assert!(matches!(err, ReconcileError::InvalidInput(_)));
    }
}
