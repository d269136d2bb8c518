//! The reconcile contract between the runtime and per-kind controllers.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::ReconcileResult;
use crate::domain::meta::{Kind, ObjectKey};

/// What a reconcile pass asks the runtime to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing further to do until an input changes.
    Done,
    /// Run again immediately.
    Requeue,
    /// Run again after the given delay, honored verbatim.
    RequeueAfter(Duration),
}

/// A level-triggered per-kind reconciler.
///
/// The runtime guarantees at most one invocation per key at a time; the
/// reconciler reads the current object from its cache or the store (the
/// input is state, not a delta) and is free to observe coalesced changes.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// The kind this reconciler owns.
    fn kind(&self) -> Kind;

    /// One level-triggered pass over a single key.
    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<ReconcileOutcome>;
}
