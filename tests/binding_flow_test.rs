//! Component-to-plane flow: the component reconciler cuts a release, the
//! binding reconciler snapshots it and applies rendered resources to the
//! data plane through the cached client.

mod common;

use std::sync::Arc;

use formation::adapters::cluster::{RecordingClientBuilder, RecordingPlaneClient};
use formation::adapters::store::InMemoryStore;
use formation::domain::meta::{Kind, ObjectKey, ObjectMeta, ResourceRef};
use formation::domain::models::{
    BindingState, Object, ReleaseBinding, ReleaseBindingSpec,
};
use formation::domain::ports::store::{ListOptions, ResourceStore};
use formation::domain::raw::RawDoc;
use formation::engine::TemplateEngine;
use formation::planes::PlaneClientCache;
use formation::reconcilers::{BindingReconciler, ComponentReconciler};
use formation::runtime::Reconciler;

use common::{component, data_plane, doc, environment, service_component_type, workload};

struct Harness {
    store: Arc<dyn ResourceStore>,
    component_reconciler: ComponentReconciler,
    binding_reconciler: BindingReconciler,
    plane_client: Arc<RecordingPlaneClient>,
}

fn harness() -> Harness {
    let store: Arc<dyn ResourceStore> = Arc::new(InMemoryStore::new());
    let engine = Arc::new(TemplateEngine::new());
    let builder = Arc::new(RecordingClientBuilder::new());
    let plane_client = builder.client();
    let clients = Arc::new(PlaneClientCache::new("v2", builder));
    let component_reconciler = ComponentReconciler::new(store.clone());
    let binding_reconciler =
        BindingReconciler::new(store.clone(), engine, clients, "formation-controller");
    Harness {
        store,
        component_reconciler,
        binding_reconciler,
        plane_client,
    }
}

async fn seed(store: &Arc<dyn ResourceStore>) -> ObjectKey {
    store.create(data_plane("dp1", "prod").into()).await.unwrap();
    store.create(environment("dev", "dp1").into()).await.unwrap();
    store
        .create(service_component_type().into())
        .await
        .unwrap();
    store.create(workload("checkout").into()).await.unwrap();
    let created = store.create(component("checkout").into()).await.unwrap();
    created.object_key()
}

#[tokio::test]
async fn component_reconcile_cuts_a_release() {
    let h = harness();
    let component_key = seed(&h.store).await;

    h.component_reconciler
        .reconcile(&component_key)
        .await
        .unwrap();

    let releases = h
        .store
        .list(Kind::ComponentRelease, ListOptions::all())
        .await
        .unwrap();
    assert_eq!(releases.len(), 1);
    let Object::ComponentRelease(release) = &releases[0] else {
        panic!()
    };
    assert_eq!(release.spec.owner.name, "checkout");
    assert_eq!(release.spec.component_type.workload_type, "service");

    // The component status points at the release.
    let Object::Component(stored) = h.store.get(&component_key).await.unwrap().unwrap() else {
        panic!()
    };
    assert_eq!(
        stored.status.latest_release.as_deref(),
        Some(release.meta.name.as_str())
    );
    assert_eq!(stored.status.observed_generation, stored.meta.generation);
}

#[tokio::test]
async fn binding_applies_rendered_resources_and_snapshots() {
    let h = harness();
    let component_key = seed(&h.store).await;
    h.component_reconciler
        .reconcile(&component_key)
        .await
        .unwrap();

    let releases = h
        .store
        .list(Kind::ComponentRelease, ListOptions::all())
        .await
        .unwrap();
    let release_name = releases[0].meta().name.clone();

    let binding = ReleaseBinding::new(
        ObjectMeta::namespaced("shop", "checkout-dev"),
        ReleaseBindingSpec {
            owner: ResourceRef::local(Kind::Component, "checkout"),
            environment: "dev".to_string(),
            release_name,
            overrides: doc("logLevel: warn\n"),
            state: BindingState::Active,
        },
    );
    let binding_key = h.store.create(binding.into()).await.unwrap().object_key();

    h.binding_reconciler.reconcile(&binding_key).await.unwrap();

    // Rendered resources reached the plane client with the field owner.
    let applies = h.plane_client.applies();
    assert_eq!(applies.len(), 2);
    assert!(applies
        .iter()
        .all(|a| a.field_owner == "formation-controller"));
    assert_eq!(
        applies[0].resource.lookup("kind"),
        Some(&RawDoc::String("Deployment".into()))
    );
    assert_eq!(
        applies[0].resource.lookup("spec.logLevel"),
        Some(&RawDoc::String("warn".into()))
    );

    // A snapshot now exists referencing the release and the overrides.
    let snapshots = h
        .store
        .list(Kind::ComponentEnvSnapshot, ListOptions::all())
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);
    let Object::ComponentEnvSnapshot(snapshot) = &snapshots[0] else {
        panic!()
    };
    assert_eq!(snapshot.spec.environment, "dev");

    // Binding status reflects the snapshot and satisfies the generation
    // invariant.
    let Object::ReleaseBinding(stored) = h.store.get(&binding_key).await.unwrap().unwrap() else {
        panic!()
    };
    assert_eq!(
        stored.status.snapshot_name.as_deref(),
        Some(snapshot.meta.name.as_str())
    );
    assert_eq!(stored.status.observed_generation, stored.meta.generation);
}

#[tokio::test]
async fn missing_release_is_a_reference_error_until_it_appears() {
    let h = harness();
    seed(&h.store).await;

    let binding = ReleaseBinding::new(
        ObjectMeta::namespaced("shop", "checkout-dev"),
        ReleaseBindingSpec {
            owner: ResourceRef::local(Kind::Component, "checkout"),
            environment: "dev".to_string(),
            release_name: "checkout-00000000".to_string(),
            overrides: RawDoc::Null,
            state: BindingState::Active,
        },
    );
    let binding_key = h.store.create(binding.into()).await.unwrap().object_key();

    let err = h
        .binding_reconciler
        .reconcile(&binding_key)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "ReferenceNotFound");
    // Reference errors wait for an input change instead of hot-looping.
    assert!(!err.should_backoff());
}
