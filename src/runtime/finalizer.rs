//! Finalizer add/remove helpers.
//!
//! Finalizer edits are the only metadata writes a reconciler performs;
//! everything else it writes goes through the status subresource.

use std::sync::Arc;

use crate::domain::errors::StoreResult;
use crate::domain::models::Object;
use crate::domain::ports::store::ResourceStore;

/// Ensure the finalizer is present, writing back if it was missing.
/// Returns the (possibly updated) object. Idempotent.
pub async fn ensure_finalizer(
    store: &Arc<dyn ResourceStore>,
    object: &Object,
    finalizer: &str,
) -> StoreResult<Object> {
    if object.meta().has_finalizer(finalizer) {
        return Ok(object.clone());
    }
    let mut updated = object.clone();
    updated.meta_mut().finalizers.push(finalizer.to_string());
    store.update(updated).await
}

/// Remove the finalizer and write back. With no finalizers left and a
/// pending deletion, the store completes the physical delete. Idempotent.
pub async fn remove_finalizer(
    store: &Arc<dyn ResourceStore>,
    object: &Object,
    finalizer: &str,
) -> StoreResult<Object> {
    if !object.meta().has_finalizer(finalizer) {
        return Ok(object.clone());
    }
    let mut updated = object.clone();
    updated.meta_mut().finalizers.retain(|f| f != finalizer);
    store.update(updated).await
}
