//! Local read-through cache of the store, one per watched kind.
//!
//! Updated by the watch stream with periodic full relists. Indexes
//! registered before the watch starts are populated by the initial relist,
//! so index lookups are complete before the first reconcile fires.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use crate::domain::meta::{Kind, ObjectKey};
use crate::domain::models::Object;
use crate::domain::ports::store::{WatchEvent, WatchEventType};

use super::index::index_value;

#[derive(Default)]
struct CacheState {
    objects: HashMap<ObjectKey, Object>,
    /// path -> value -> keys.
    indexes: HashMap<String, HashMap<String, BTreeSet<ObjectKey>>>,
}

/// Thread-safe object cache with field indexes for one kind.
pub struct KindCache {
    kind: Kind,
    state: RwLock<CacheState>,
}

impl KindCache {
    /// Empty cache for a kind with the given index paths.
    pub fn new(kind: Kind, index_paths: impl IntoIterator<Item = String>) -> Self {
        let mut state = CacheState::default();
        for path in index_paths {
            state.indexes.entry(path).or_default();
        }
        Self {
            kind,
            state: RwLock::new(state),
        }
    }

    /// Kind this cache serves.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Register an index path. Must happen before the watch starts; the
    /// initial relist populates it.
    pub fn register_index(&self, path: &str) {
        self.state
            .write()
            .expect("cache lock poisoned")
            .indexes
            .entry(path.to_string())
            .or_default();
    }

    /// Fetch a cached object.
    pub fn get(&self, key: &ObjectKey) -> Option<Object> {
        self.state
            .read()
            .expect("cache lock poisoned")
            .objects
            .get(key)
            .cloned()
    }

    /// All cached objects.
    pub fn list(&self) -> Vec<Object> {
        self.state
            .read()
            .expect("cache lock poisoned")
            .objects
            .values()
            .cloned()
            .collect()
    }

    /// Keys whose indexed field at `path` equals `value`, in stable order.
    pub fn by_index(&self, path: &str, value: &str) -> Vec<ObjectKey> {
        self.state
            .read()
            .expect("cache lock poisoned")
            .indexes
            .get(path)
            .and_then(|by_value| by_value.get(value))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Apply one watch event, returning the key to reconcile.
    pub fn apply_event(&self, event: &WatchEvent) -> ObjectKey {
        let key = event.object.object_key();
        let mut state = self.state.write().expect("cache lock poisoned");
        match event.event_type {
            WatchEventType::Added | WatchEventType::Modified => {
                remove_from_indexes(&mut state, &key);
                insert_into_indexes(&mut state, &key, &event.object);
                state.objects.insert(key.clone(), event.object.clone());
            }
            WatchEventType::Deleted => {
                remove_from_indexes(&mut state, &key);
                state.objects.remove(&key);
            }
        }
        key
    }

    /// Replace the whole cache from a relist. Returns every known key
    /// (current plus just-removed) so the caller can re-enqueue them all:
    /// lost events never silently lose work.
    pub fn replace_all(&self, objects: Vec<Object>) -> Vec<ObjectKey> {
        let mut state = self.state.write().expect("cache lock poisoned");
        let mut keys: BTreeSet<ObjectKey> = state.objects.keys().cloned().collect();

        state.objects.clear();
        for by_value in state.indexes.values_mut() {
            by_value.clear();
        }
        for object in objects {
            let key = object.object_key();
            insert_into_indexes(&mut state, &key, &object);
            state.objects.insert(key.clone(), object);
            keys.insert(key);
        }
        keys.into_iter().collect()
    }
}

fn insert_into_indexes(state: &mut CacheState, key: &ObjectKey, object: &Object) {
    for (path, by_value) in &mut state.indexes {
        if let Some(value) = index_value(object, path) {
            by_value.entry(value).or_default().insert(key.clone());
        }
    }
}

fn remove_from_indexes(state: &mut CacheState, key: &ObjectKey) {
    for by_value in state.indexes.values_mut() {
        by_value.retain(|_, keys| {
            keys.remove(key);
            !keys.is_empty()
        });
    }
}
