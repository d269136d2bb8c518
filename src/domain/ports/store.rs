//! Resource store port.
//!
//! The control plane assumes an external typed store with watch/list/get
//! CRUD semantics, optimistic concurrency, and a status subresource. The
//! in-memory adapter implements this for the runtime cache and tests.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::errors::StoreResult;
use crate::domain::meta::{Kind, ObjectKey};
use crate::domain::models::Object;

/// What happened to an object on the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    /// Object created (or first seen by this stream).
    Added,
    /// Spec, metadata, or status changed.
    Modified,
    /// Object physically removed from the store.
    Deleted,
}

/// One watch stream entry.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    /// What happened.
    pub event_type: WatchEventType,
    /// The object after the change (for deletes, the last stored state).
    pub object: Object,
}

/// Stream of watch events for one kind.
pub type WatchStream = BoxStream<'static, WatchEvent>;

/// Matcher against a registered field index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    /// Dotted path into the object's wire form, e.g. `spec.owner.name`.
    pub path: String,
    /// Required value at that path.
    pub value: String,
}

/// Options for list calls.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Restrict to one namespace.
    pub namespace: Option<String>,
    /// Restrict to objects matching a field-index entry.
    pub field_selector: Option<FieldSelector>,
}

impl ListOptions {
    /// List everything of the kind.
    pub fn all() -> Self {
        Self::default()
    }

    /// List one namespace.
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// List objects whose indexed field matches a value.
    pub fn matching(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_selector: Some(FieldSelector {
                path: path.into(),
                value: value.into(),
            }),
            ..Self::default()
        }
    }
}

/// Typed resource store with optimistic concurrency and a status
/// subresource.
///
/// Writes take the full object; `update`/`update_status` compare the
/// carried `resource_version` against the stored one and fail with
/// `StoreError::Conflict` on mismatch. `update` never touches status;
/// `update_status` never touches spec or metadata (finalizer edits go
/// through `update`).
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch one object, `None` if absent.
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<Object>>;

    /// List objects of a kind.
    async fn list(&self, kind: Kind, opts: ListOptions) -> StoreResult<Vec<Object>>;

    /// Open a watch stream for a kind. The stream carries changes from the
    /// moment of the call; callers pair it with `list` for a full relist.
    async fn watch(&self, kind: Kind) -> StoreResult<WatchStream>;

    /// Create a new object. Fails if the identity exists (terminating
    /// objects included).
    async fn create(&self, object: Object) -> StoreResult<Object>;

    /// Update spec/metadata with optimistic concurrency; bumps
    /// `generation` when the spec changed.
    async fn update(&self, object: Object) -> StoreResult<Object>;

    /// Update the status subresource with optimistic concurrency; never
    /// bumps `generation`.
    async fn update_status(&self, object: Object) -> StoreResult<Object>;

    /// Request deletion. With finalizers present this stamps
    /// `deletion_timestamp`; without, the object is removed immediately.
    async fn delete(&self, key: &ObjectKey) -> StoreResult<()>;
}
