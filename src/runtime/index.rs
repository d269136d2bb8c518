//! Cross-kind wiring: field indexes and map functions.
//!
//! Reconcilers declare field indexes (`(kind, path)` pairs extracted from
//! the object's wire form) and map functions that turn a changed object of
//! another kind into the set of own-kind keys to wake. Fan-out is
//! unordered; each woken key reconciles independently.

use std::sync::Arc;

use crate::domain::meta::{Kind, ObjectKey};
use crate::domain::models::Object;

/// Declaration of one field index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Kind being indexed.
    pub kind: Kind,
    /// Dotted path into the wire form, e.g. `spec.owner.name`.
    pub path: String,
}

impl IndexSpec {
    /// Index `path` on `kind`.
    pub fn new(kind: Kind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Extract the indexed value of an object at a dotted path. Only scalar
/// leaves index; containers and nulls do not.
pub fn index_value(object: &Object, path: &str) -> Option<String> {
    let wire = object.to_wire();
    let mut current = &wire;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    match current {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Maps a changed source object to the keys of the watching kind that
/// must reconcile.
pub type MapFn = Arc<dyn Fn(&Object) -> Vec<ObjectKey> + Send + Sync>;

/// A cross-kind watch: when `source_kind` changes, `mapper` computes the
/// keys to enqueue on the owning controller's queue.
#[derive(Clone)]
pub struct WatchInterest {
    /// Kind whose changes trigger the mapping.
    pub source_kind: Kind,
    /// Key derivation from the changed object.
    pub mapper: MapFn,
}

impl WatchInterest {
    /// Watch `source_kind` through `mapper`.
    pub fn new(
        source_kind: Kind,
        mapper: impl Fn(&Object) -> Vec<ObjectKey> + Send + Sync + 'static,
    ) -> Self {
        Self {
            source_kind,
            mapper: Arc::new(mapper),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::meta::ObjectMeta;
    use crate::domain::models::{EnvSettings, EnvSettingsSpec};
    use crate::domain::meta::ResourceRef;

    fn settings(component: &str, environment: &str) -> Object {
        EnvSettings::new(
            ObjectMeta::namespaced("shop", format!("{component}-{environment}")),
            EnvSettingsSpec {
                component: ResourceRef::local(Kind::Component, component),
                environment: environment.to_string(),
                overrides: crate::domain::raw::RawDoc::Null,
            },
        )
        .into()
    }

    #[test]
    fn test_index_value_extraction() {
        let object = settings("checkout", "dev");
        assert_eq!(
            index_value(&object, "spec.component.name").as_deref(),
            Some("checkout")
        );
        assert_eq!(
            index_value(&object, "spec.environment").as_deref(),
            Some("dev")
        );
        assert_eq!(index_value(&object, "spec.nope"), None);
        // Containers do not index.
        assert_eq!(index_value(&object, "spec"), None);
    }
}
