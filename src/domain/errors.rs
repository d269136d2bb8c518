//! Error taxonomy for the control plane.
//!
//! Reconcile errors are classified so the runtime can choose between
//! backoff, condition reporting, and waiting for an input change. Store
//! conflicts are a dedicated variant: the runtime converts them into silent
//! requeues rather than surfacing them.

use thiserror::Error;

use super::meta::ObjectKey;

/// Errors returned by the typed resource store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed object does not exist.
    #[error("not found: {0}")]
    NotFound(ObjectKey),

    /// An object with the same identity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(ObjectKey),

    /// Optimistic-concurrency failure: the stored `resource_version`
    /// differs from the one on the write.
    #[error("conflict writing {key}: stored version {stored}, write carried {attempted}")]
    Conflict {
        /// Object being written.
        key: ObjectKey,
        /// Version currently in the store.
        stored: u64,
        /// Version the write was based on.
        attempted: u64,
    },

    /// Create was attempted while the object is terminating.
    #[error("{0} is terminating and cannot be replaced")]
    Terminating(ObjectKey),

    /// The payload did not match the kind's type.
    #[error("kind mismatch: expected {expected}, got {got}")]
    KindMismatch {
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind found in the store.
        got: &'static str,
    },

    /// Transport or internal store failure.
    #[error("store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether this error is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether this error is a not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from gateway RPCs.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway is unreachable or returned a 5xx; worth retrying.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway rejected the request; retrying is pointless.
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors from remote plane apply/get calls.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// 5xx, timeout, or connection failure; retried with backoff.
    #[error("remote apply failed transiently: {0}")]
    Transient(String),

    /// The remote API permanently rejected the payload (4xx, non-conflict).
    #[error("remote apply rejected: {0}")]
    Rejected(String),
}

/// Classified reconcile failure, driving the runtime's retry policy
/// and the condition written to status.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Store conflicts, remote 5xx, timeouts, gateway unavailable,
    /// missing data in an expression. Requeued with backoff and no
    /// condition change unless persistent.
    #[error("transient: {0}")]
    Transient(String),

    /// A referenced object is absent. Re-reconciled when the reference
    /// appears, via index fan-out.
    #[error("reference not found: {path} -> {key}")]
    ReferenceMissing {
        /// Dotted spec path of the dangling reference.
        path: String,
        /// Key the reference resolves to.
        key: ObjectKey,
    },

    /// Schema validation, expression syntax, or disjointness violations.
    /// Not requeued until the spec changes.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The remote API permanently rejected an apply. Requeued on a slow
    /// backoff so remote policy changes are eventually picked up.
    #[error("apply rejected: {0}")]
    ApplyRejected(String),

    /// Programmer error recovered at the reconciler boundary.
    #[error("internal reconciler failure: {0}")]
    Fatal(String),
}

impl ReconcileError {
    /// Condition reason string written to status for this class.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Transient(_) => "TransientFailure",
            Self::ReferenceMissing { .. } => "ReferenceNotFound",
            Self::InvalidInput(_) => "Invalid",
            Self::ApplyRejected(_) => "ApplyRejected",
            Self::Fatal(_) => "InternalError",
        }
    }

    /// Whether the runtime should retry with backoff (as opposed to
    /// waiting for an input change).
    pub fn should_backoff(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::ApplyRejected(_) | Self::Fatal(_)
        )
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        Self::Transient(err.to_string())
    }
}

impl From<GatewayError> for ReconcileError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(m) => Self::Transient(format!("gateway: {m}")),
            GatewayError::Rejected(m) => Self::ApplyRejected(format!("gateway: {m}")),
        }
    }
}

impl From<ApplyError> for ReconcileError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Transient(m) => Self::Transient(m),
            ApplyError::Rejected(m) => Self::ApplyRejected(m),
        }
    }
}

/// Result alias for reconcile passes.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
