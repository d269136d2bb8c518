//! The reconciliation runtime: level-triggered control loops over the
//! typed store.
//!
//! Each registered controller owns one kind. The runtime maintains a
//! read-through cache per watched kind (watch stream + periodic relist),
//! dispatches per-key reconciles through rate-limited queues with per-key
//! serialization, fans changes out across kinds through map functions, and
//! provides finalizer and condition helpers for the deletion and status
//! protocols.

mod cache;
mod conditions;
mod finalizer;
mod index;
mod manager;
mod queue;
mod reconciler;

pub use cache::KindCache;
pub use conditions::{
    clear_condition, condition, find_condition, set_condition, CONDITION_DEGRADED,
    CONDITION_READY,
};
pub use finalizer::{ensure_finalizer, remove_finalizer};
pub use index::{index_value, IndexSpec, MapFn, WatchInterest};
pub use manager::{ControllerManager, ControllerSpec, DEFAULT_RELIST_INTERVAL};
pub use queue::{WorkQueue, BACKOFF_BASE, BACKOFF_CAP};
pub use reconciler::{ReconcileOutcome, Reconciler};
