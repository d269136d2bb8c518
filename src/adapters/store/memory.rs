//! In-memory typed resource store.
//!
//! Implements the full store contract: optimistic concurrency via a
//! store-wide `resource_version` counter, `generation` advanced on spec
//! changes only, a status subresource that never touches spec, finalizer-
//! aware deletion (`deletion_timestamp` stamped while finalizers remain),
//! and broadcast-backed watch streams. Backs the runtime cache and every
//! test; production deployments swap in a persistent implementation of
//! the same port.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use tokio::sync::broadcast;

use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::meta::{Kind, ObjectKey};
use crate::domain::models::Object;
use crate::domain::ports::store::{
    ListOptions, ResourceStore, WatchEvent, WatchEventType, WatchStream,
};
use crate::runtime::index_value;

/// Watch channel capacity; slow consumers observe a closed stream and
/// recover through a relist.
const WATCH_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct StoreState {
    objects: HashMap<ObjectKey, Object>,
    resource_version: u64,
}

/// Thread-safe in-memory store with watch support.
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    watchers: RwLock<HashMap<Kind, broadcast::Sender<WatchEvent>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// New empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            watchers: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, kind: Kind) -> broadcast::Sender<WatchEvent> {
        if let Some(sender) = self.watchers.read().expect("watchers poisoned").get(&kind) {
            return sender.clone();
        }
        let mut watchers = self.watchers.write().expect("watchers poisoned");
        watchers
            .entry(kind)
            .or_insert_with(|| broadcast::channel(WATCH_CHANNEL_CAPACITY).0)
            .clone()
    }

    fn broadcast(&self, event_type: WatchEventType, object: Object) {
        let kind = object.kind();
        // Send errors only mean nobody is watching.
        let _ = self.sender(kind).send(WatchEvent { event_type, object });
    }

    fn spec_of(object: &Object) -> serde_json::Value {
        object
            .to_wire()
            .get("spec")
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Option<Object>> {
        Ok(self
            .state
            .read()
            .expect("store poisoned")
            .objects
            .get(key)
            .cloned())
    }

    async fn list(&self, kind: Kind, opts: ListOptions) -> StoreResult<Vec<Object>> {
        let state = self.state.read().expect("store poisoned");
        let mut out: Vec<Object> = state
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .filter(|(key, _)| match &opts.namespace {
                Some(namespace) => key.namespace.as_deref() == Some(namespace.as_str()),
                None => true,
            })
            .filter(|(_, object)| match &opts.field_selector {
                Some(selector) => {
                    index_value(object, &selector.path).as_deref() == Some(selector.value.as_str())
                }
                None => true,
            })
            .map(|(_, object)| object.clone())
            .collect();
        out.sort_by(|a, b| a.object_key().cmp(&b.object_key()));
        Ok(out)
    }

    async fn watch(&self, kind: Kind) -> StoreResult<WatchStream> {
        let receiver = self.sender(kind).subscribe();
        let stream = stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((event, receiver)),
                // A lagged consumer has lost events; end the stream so the
                // watcher relists instead of acting on gaps.
                Err(broadcast::error::RecvError::Lagged(_))
                | Err(broadcast::error::RecvError::Closed) => None,
            }
        });
        Ok(Box::pin(stream))
    }

    async fn create(&self, mut object: Object) -> StoreResult<Object> {
        let key = object.object_key();
        let created = {
            let mut state = self.state.write().expect("store poisoned");
            if let Some(existing) = state.objects.get(&key) {
                if existing.meta().is_terminating() {
                    return Err(StoreError::Terminating(key));
                }
                return Err(StoreError::AlreadyExists(key));
            }
            state.resource_version += 1;
            let meta = object.meta_mut();
            meta.resource_version = state.resource_version;
            meta.generation = 1;
            meta.uid = Some(uuid::Uuid::new_v4());
            meta.creation_timestamp = Some(Utc::now());
            meta.deletion_timestamp = None;
            state.objects.insert(key, object.clone());
            object
        };
        self.broadcast(WatchEventType::Added, created.clone());
        Ok(created)
    }

    async fn update(&self, mut object: Object) -> StoreResult<Object> {
        let key = object.object_key();
        let (updated, deleted) = {
            let mut state = self.state.write().expect("store poisoned");
            let Some(stored) = state.objects.get(&key) else {
                return Err(StoreError::NotFound(key));
            };
            let stored_version = stored.meta().resource_version;
            if stored.meta().resource_version != object.meta().resource_version {
                return Err(StoreError::Conflict {
                    key,
                    stored: stored_version,
                    attempted: object.meta().resource_version,
                });
            }

            let spec_changed = Self::spec_of(stored) != Self::spec_of(&object);
            let stored_meta = stored.meta().clone();
            let stored_status = stored.clone();

            // Carry the stored status through: update never mutates the
            // status subresource.
            copy_status(&stored_status, &mut object);

            state.resource_version += 1;
            let meta = object.meta_mut();
            meta.generation = stored_meta.generation + i64::from(spec_changed);
            meta.uid = stored_meta.uid;
            meta.creation_timestamp = stored_meta.creation_timestamp;
            meta.deletion_timestamp = stored_meta.deletion_timestamp;
            meta.resource_version = state.resource_version;

            // Removing the last finalizer from a terminating object
            // completes its physical deletion.
            let finishes_delete =
                object.meta().is_terminating() && object.meta().finalizers.is_empty();
            if finishes_delete {
                state.objects.remove(&key);
            } else {
                state.objects.insert(key, object.clone());
            }
            (object, finishes_delete)
        };
        if deleted {
            self.broadcast(WatchEventType::Deleted, updated.clone());
        } else {
            self.broadcast(WatchEventType::Modified, updated.clone());
        }
        Ok(updated)
    }

    async fn update_status(&self, object: Object) -> StoreResult<Object> {
        let key = object.object_key();
        let updated = {
            let mut state = self.state.write().expect("store poisoned");
            let Some(stored) = state.objects.get(&key) else {
                return Err(StoreError::NotFound(key));
            };
            if stored.meta().resource_version != object.meta().resource_version {
                return Err(StoreError::Conflict {
                    key,
                    stored: stored.meta().resource_version,
                    attempted: object.meta().resource_version,
                });
            }

            // Status writes never mutate spec or metadata: start from the
            // stored object and copy only the status over.
            let mut updated = stored.clone();
            copy_status(&object, &mut updated);

            state.resource_version += 1;
            updated.meta_mut().resource_version = state.resource_version;
            state.objects.insert(key, updated.clone());
            updated
        };
        self.broadcast(WatchEventType::Modified, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, key: &ObjectKey) -> StoreResult<()> {
        let outcome = {
            let mut state = self.state.write().expect("store poisoned");
            let Some(stored) = state.objects.get(key) else {
                return Err(StoreError::NotFound(key.clone()));
            };

            if stored.meta().finalizers.is_empty() {
                let removed = state.objects.remove(key).expect("checked above");
                Some((WatchEventType::Deleted, removed))
            } else if stored.meta().is_terminating() {
                // Deletion already requested; nothing more to do until
                // finalizers clear.
                None
            } else {
                let mut updated = stored.clone();
                state.resource_version += 1;
                let meta = updated.meta_mut();
                meta.deletion_timestamp = Some(Utc::now());
                meta.resource_version = state.resource_version;
                state.objects.insert(key.clone(), updated.clone());
                Some((WatchEventType::Modified, updated))
            }
        };
        if let Some((event_type, object)) = outcome {
            self.broadcast(event_type, object);
        }
        Ok(())
    }
}

/// Copy the status subresource from `source` into `target`. Both must be
/// the same kind; mismatches are ignored (the store validates kinds at
/// the key level).
fn copy_status(source: &Object, target: &mut Object) {
    macro_rules! copy {
        ($($variant:ident),+) => {
            match (source, target) {
                $((Object::$variant(from), Object::$variant(to)) => {
                    to.status = from.status.clone();
                })+
                _ => {}
            }
        };
    }
    copy!(
        DataPlane,
        BuildPlane,
        ObservabilityPlane,
        Project,
        Environment,
        Component,
        ComponentType,
        TraitDef,
        Workload,
        EnvSettings,
        ReleaseBinding,
        ComponentRelease,
        ComponentEnvSnapshot,
        Workflow,
        WorkflowRun
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    use crate::domain::meta::{ObjectMeta, Resource, ResourceRef};
    use crate::domain::models::{
        AgentConnection, DataPlane, DataPlaneSpec, EnvSettings, EnvSettingsSpec,
    };
    use crate::domain::ports::store::FieldSelector;
    use crate::domain::raw::RawDoc;

    fn plane(name: &str, plane_id: &str) -> Object {
        DataPlane::new(
            ObjectMeta::namespaced("infra", name),
            DataPlaneSpec {
                plane_id: plane_id.to_string(),
                connection: AgentConnection::default(),
                observability_plane_ref: None,
            },
        )
        .into()
    }

    #[tokio::test]
    async fn test_create_initializes_metadata() {
        let store = InMemoryStore::new();
        let created = store.create(plane("dp1", "prod")).await.unwrap();
        assert_eq!(created.meta().generation, 1);
        assert_eq!(created.meta().resource_version, 1);
        assert!(created.meta().creation_timestamp.is_some());

        let err = store.create(plane("dp1", "prod")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_bumps_generation_only_on_spec_change() {
        let store = InMemoryStore::new();
        let created = store.create(plane("dp1", "prod")).await.unwrap();

        // Metadata-only update (finalizer add): no generation bump.
        let mut with_finalizer = created.clone();
        with_finalizer
            .meta_mut()
            .finalizers
            .push("formation.dev/plane".into());
        let updated = store.update(with_finalizer).await.unwrap();
        assert_eq!(updated.meta().generation, 1);
        assert!(updated.meta().resource_version > created.meta().resource_version);

        // Spec change: generation bumps.
        let Object::DataPlane(mut dp) = updated.clone() else {
            panic!()
        };
        dp.spec.plane_id = "staging".into();
        let updated = store.update(dp.into()).await.unwrap();
        assert_eq!(updated.meta().generation, 2);
    }

    #[tokio::test]
    async fn test_update_conflict_on_stale_version() {
        let store = InMemoryStore::new();
        let created = store.create(plane("dp1", "prod")).await.unwrap();

        let Object::DataPlane(mut first) = created.clone() else {
            panic!()
        };
        first.spec.plane_id = "a".into();
        store.update(first.into()).await.unwrap();

        // Second writer still holds the original version.
        let Object::DataPlane(mut second) = created else { panic!() };
        second.spec.plane_id = "b".into();
        let err = store.update(second.into()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_status_update_never_touches_spec() {
        let store = InMemoryStore::new();
        let created = store.create(plane("dp1", "prod")).await.unwrap();

        let Object::DataPlane(mut dp) = created else { panic!() };
        dp.status.connected = true;
        dp.status.observed_generation = 1;
        // A sneaky spec change through the status path must not stick.
        dp.spec.plane_id = "hijacked".into();
        let updated = store.update_status(dp.into()).await.unwrap();

        let Object::DataPlane(stored) = updated else { panic!() };
        assert_eq!(stored.spec.plane_id, "prod");
        assert!(stored.status.connected);
        assert_eq!(stored.meta.generation, 1);
    }

    #[tokio::test]
    async fn test_finalizer_blocks_physical_deletion() {
        let store = InMemoryStore::new();
        let created = store.create(plane("dp1", "prod")).await.unwrap();
        let mut with_finalizer = created.clone();
        with_finalizer
            .meta_mut()
            .finalizers
            .push("formation.dev/plane".into());
        let stored = store.update(with_finalizer).await.unwrap();

        store.delete(&stored.object_key()).await.unwrap();
        let terminating = store.get(&stored.object_key()).await.unwrap().unwrap();
        assert!(terminating.meta().is_terminating());

        // Removing the finalizer completes the delete.
        let mut cleared = terminating.clone();
        cleared.meta_mut().finalizers.clear();
        store.update(cleared).await.unwrap();
        assert!(store.get(&stored.object_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_without_finalizers_is_immediate() {
        let store = InMemoryStore::new();
        let created = store.create(plane("dp1", "prod")).await.unwrap();
        store.delete(&created.object_key()).await.unwrap();
        assert!(store.get(&created.object_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_watch_delivers_lifecycle_events() {
        let store = InMemoryStore::new();
        let mut stream = store.watch(Kind::DataPlane).await.unwrap();

        let created = store.create(plane("dp1", "prod")).await.unwrap();
        let event = stream.next().await.unwrap();
        assert_eq!(event.event_type, WatchEventType::Added);

        let Object::DataPlane(mut dp) = created else { panic!() };
        dp.spec.plane_id = "staging".into();
        store.update(dp.into()).await.unwrap();
        let event = stream.next().await.unwrap();
        assert_eq!(event.event_type, WatchEventType::Modified);

        store
            .delete(&ObjectKey::namespaced(Kind::DataPlane, "infra", "dp1"))
            .await
            .unwrap();
        let event = stream.next().await.unwrap();
        assert_eq!(event.event_type, WatchEventType::Deleted);
    }

    #[tokio::test]
    async fn test_list_with_field_selector() {
        let store = InMemoryStore::new();
        for (name, component) in [("a", "checkout"), ("b", "checkout"), ("c", "cart")] {
            let settings: Object = EnvSettings::new(
                ObjectMeta::namespaced("shop", name),
                EnvSettingsSpec {
                    component: ResourceRef::local(Kind::Component, component),
                    environment: "dev".to_string(),
                    overrides: RawDoc::Null,
                },
            )
            .into();
            store.create(settings).await.unwrap();
        }

        let matched = store
            .list(
                Kind::EnvSettings,
                ListOptions {
                    namespace: Some("shop".into()),
                    field_selector: Some(FieldSelector {
                        path: "spec.component.name".into(),
                        value: "checkout".into(),
                    }),
                },
            )
            .await
            .unwrap();
        assert_eq!(matched.len(), 2);
    }

    #[tokio::test]
    async fn test_observed_generation_invariant_reachable() {
        // After a reconcile writes observed_generation == generation, the
        // stored object satisfies the invariant.
        let store = InMemoryStore::new();
        let created = store.create(plane("dp1", "prod")).await.unwrap();
        let Object::DataPlane(mut dp) = created else { panic!() };
        let generation = dp.meta.generation;
        dp.set_observed_generation(generation);
        let stored = store.update_status(dp.into()).await.unwrap();
        let Object::DataPlane(stored) = stored else { panic!() };
        assert_eq!(stored.status.observed_generation, stored.meta.generation);
    }
}
