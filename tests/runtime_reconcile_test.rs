//! Runtime behavior over the in-memory store: level-triggered dispatch,
//! cross-index wake, status discipline, and write idempotence.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use formation::adapters::store::InMemoryStore;
use formation::domain::errors::ReconcileResult;
use formation::domain::meta::{Kind, ObjectKey, ObjectMeta, ResourceRef};
use formation::domain::models::{
    ComponentEnvSnapshot, ComponentEnvSnapshotSpec, EnvSettings, EnvSettingsSpec, Object,
};
use formation::domain::ports::store::ResourceStore;
use formation::domain::raw::RawDoc;
use formation::reconcilers::{wake_settings_for, EnvSettingsReconciler, ENV_SETTINGS_COMPONENT_INDEX};
use formation::runtime::{
    ControllerManager, ControllerSpec, IndexSpec, ReconcileOutcome, Reconciler, WatchInterest,
};

fn settings(name: &str, component: &str, environment: &str) -> EnvSettings {
    EnvSettings::new(
        ObjectMeta::namespaced("shop", name),
        EnvSettingsSpec {
            component: ResourceRef::local(Kind::Component, component),
            environment: environment.to_string(),
            overrides: RawDoc::Null,
        },
    )
}

fn snapshot(name: &str, component: &str, environment: &str) -> ComponentEnvSnapshot {
    ComponentEnvSnapshot::new(
        ObjectMeta::namespaced("shop", name),
        ComponentEnvSnapshotSpec {
            component: ResourceRef::local(Kind::Component, component),
            environment: environment.to_string(),
            release_name: format!("{component}-abc12345"),
            env_overrides: RawDoc::Null,
        },
    )
}

/// Records every key it reconciles.
struct RecordingReconciler {
    kind: Kind,
    seen: Arc<Mutex<Vec<ObjectKey>>>,
}

#[async_trait]
impl Reconciler for RecordingReconciler {
    fn kind(&self) -> Kind {
        self.kind
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<ReconcileOutcome> {
        self.seen.lock().unwrap().push(key.clone());
        Ok(ReconcileOutcome::Done)
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn cross_index_wake_targets_only_the_matching_pair() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryStore::new());
    let manager = Arc::new(ControllerManager::new(
        store.clone(),
        Duration::from_secs(300),
    ));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let settings_cache = manager.cache_for(Kind::EnvSettings);
    manager.register(ControllerSpec {
        reconciler: Arc::new(RecordingReconciler {
            kind: Kind::EnvSettings,
            seen: seen.clone(),
        }),
        workers: 1,
        watches: vec![WatchInterest::new(Kind::ComponentEnvSnapshot, {
            let settings_cache = settings_cache.clone();
            move |object: &Object| {
                let Object::ComponentEnvSnapshot(snapshot) = object else {
                    return Vec::new();
                };
                wake_settings_for(
                    &settings_cache,
                    &snapshot.spec.component.name,
                    &snapshot.spec.environment,
                )
            }
        })],
        indexes: vec![IndexSpec::new(Kind::EnvSettings, ENV_SETTINGS_COMPONENT_INDEX)],
    });

    // Seed settings for (checkout, dev) before the manager starts so the
    // initial relist populates the index.
    store
        .create(settings("checkout-dev", "checkout", "dev").into())
        .await
        .unwrap();

    let run_manager = manager.clone();
    let run = tokio::spawn(async move { run_manager.run().await });
    settle().await;

    let settings_key = ObjectKey::namespaced(Kind::EnvSettings, "shop", "checkout-dev");
    let initial = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|k| **k == settings_key)
        .count();
    assert!(initial >= 1, "initial relist reconciles the settings key");

    // A matching snapshot wakes the settings key.
    store
        .create(snapshot("snap-dev", "checkout", "dev").into())
        .await
        .unwrap();
    settle().await;
    let after_match = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|k| **k == settings_key)
        .count();
    assert!(
        after_match > initial,
        "matching snapshot must wake the settings key"
    );

    // A different-environment snapshot wakes nothing.
    store
        .create(snapshot("snap-prod", "checkout", "prod").into())
        .await
        .unwrap();
    settle().await;
    let after_mismatch = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|k| **k == settings_key)
        .count();
    assert_eq!(
        after_mismatch, after_match,
        "different-environment snapshot must not wake the settings key"
    );

    manager.shutdown();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn reconcile_stamps_observed_generation_and_is_idempotent() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryStore::new());
    let reconciler = EnvSettingsReconciler::new(store.clone());

    let created = store
        .create(settings("checkout-dev", "checkout", "dev").into())
        .await
        .unwrap();
    let key = created.object_key();

    reconciler.reconcile(&key).await.unwrap();
    let after_first = store.get(&key).await.unwrap().unwrap();
    let Object::EnvSettings(after_first) = after_first else {
        panic!()
    };
    assert_eq!(
        after_first.status.observed_generation,
        after_first.meta.generation
    );
    let version_after_first = after_first.meta.resource_version;

    // Reconciling the unchanged object again writes nothing.
    reconciler.reconcile(&key).await.unwrap();
    let after_second = store.get(&key).await.unwrap().unwrap();
    assert_eq!(after_second.meta().resource_version, version_after_first);
}

#[tokio::test]
async fn level_triggered_coalescing_still_observes_latest_spec() {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryStore::new());
    let manager = Arc::new(ControllerManager::new(
        store.clone(),
        Duration::from_secs(300),
    ));

    // A reconciler that records the generation it observed.
    struct GenerationObserver {
        store: Arc<dyn ResourceStore>,
        max_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Reconciler for GenerationObserver {
        fn kind(&self) -> Kind {
            Kind::EnvSettings
        }

        async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<ReconcileOutcome> {
            if let Some(object) = self.store.get(key).await? {
                let generation = object.meta().generation as usize;
                self.max_seen.fetch_max(generation, Ordering::SeqCst);
            }
            Ok(ReconcileOutcome::Done)
        }
    }

    let max_seen = Arc::new(AtomicUsize::new(0));
    manager.register(ControllerSpec {
        reconciler: Arc::new(GenerationObserver {
            store: store.clone(),
            max_seen: max_seen.clone(),
        }),
        workers: 1,
        watches: Vec::new(),
        indexes: Vec::new(),
    });

    let run_manager = manager.clone();
    let run = tokio::spawn(async move { run_manager.run().await });
    // Let the manager open its watch streams before mutating.
    settle().await;

    let created = store
        .create(settings("checkout-dev", "checkout", "dev").into())
        .await
        .unwrap();

    // Three rapid spec edits; reconciles may coalesce but must eventually
    // observe the final generation.
    let mut current = created;
    for i in 0..3 {
        let Object::EnvSettings(mut inner) = current.clone() else {
            panic!()
        };
        inner.spec.overrides = common::doc(&format!("rev: {i}\n"));
        current = store.update(inner.into()).await.unwrap();
    }
    let final_generation = current.meta().generation as usize;

    settle().await;
    assert_eq!(max_seen.load(Ordering::SeqCst), final_generation);

    manager.shutdown();
    run.await.unwrap().unwrap();
}
