//! Per-kind reconcilers and their wiring into the controller manager.

mod binding;
mod component;
mod envsettings;
mod plane;
mod project;
mod workflow;

pub use binding::{
    BindingReconciler, BINDING_ENVIRONMENT_INDEX, BINDING_FINALIZER, BINDING_OWNER_INDEX,
    ENV_SETTINGS_COMPONENT_INDEX,
};
pub use component::{ComponentReconciler, COMPONENT_FINALIZER, RELEASE_OWNER_INDEX};
pub use envsettings::EnvSettingsReconciler;
pub use plane::{PlaneReconciler, PlaneResource, PLANE_FINALIZER};
pub use project::ProjectReconciler;
pub use workflow::WorkflowRunReconciler;

use std::sync::Arc;
use std::time::Duration;

use crate::config::ObservabilityPolicy;
use crate::domain::meta::{Kind, ObjectKey, Resource};
use crate::domain::models::{BuildPlane, DataPlane, Object, ObservabilityPlane};
use crate::engine::TemplateEngine;
use crate::planes::{PlaneClientCache, PlaneLifecycle};
use crate::runtime::{ControllerManager, ControllerSpec, IndexSpec, KindCache, WatchInterest};

/// Worker counts per controller.
#[derive(Debug, Clone)]
pub struct WorkerCounts {
    /// Workers per plane variant.
    pub planes: usize,
    /// Project workers.
    pub projects: usize,
    /// Component workers.
    pub components: usize,
    /// Binding workers.
    pub bindings: usize,
    /// Env-settings workers.
    pub env_settings: usize,
    /// Workflow-run workers.
    pub workflow_runs: usize,
}

impl Default for WorkerCounts {
    fn default() -> Self {
        Self {
            planes: 1,
            projects: 1,
            components: 2,
            bindings: 2,
            env_settings: 1,
            workflow_runs: 2,
        }
    }
}

/// Shared dependencies handed to every controller.
pub struct ControllerDeps {
    /// Expression engine shared across renders.
    pub engine: Arc<TemplateEngine>,
    /// Plane client cache.
    pub clients: Arc<PlaneClientCache>,
    /// Gateway lifecycle notifier.
    pub lifecycle: Arc<PlaneLifecycle>,
    /// Field owner stamped on remote applies.
    pub field_owner: String,
    /// Agent-status poll cadence.
    pub status_interval: Duration,
    /// Behavior when a plane names no observability plane.
    pub observability_policy: ObservabilityPolicy,
    /// Worker counts.
    pub workers: WorkerCounts,
}

/// Register every controller with its watches and indexes.
pub fn register_all(manager: &ControllerManager, deps: &ControllerDeps) {
    let store = manager.store();

    for plane_kind in [Kind::DataPlane, Kind::BuildPlane, Kind::ObservabilityPlane] {
        let reconciler: Arc<dyn crate::runtime::Reconciler> = match plane_kind {
            Kind::DataPlane => Arc::new(PlaneReconciler::<DataPlane>::new(
                store.clone(),
                deps.clients.clone(),
                deps.lifecycle.clone(),
                deps.status_interval,
                deps.observability_policy,
            )),
            Kind::BuildPlane => Arc::new(PlaneReconciler::<BuildPlane>::new(
                store.clone(),
                deps.clients.clone(),
                deps.lifecycle.clone(),
                deps.status_interval,
                deps.observability_policy,
            )),
            _ => Arc::new(PlaneReconciler::<ObservabilityPlane>::new(
                store.clone(),
                deps.clients.clone(),
                deps.lifecycle.clone(),
                deps.status_interval,
                deps.observability_policy,
            )),
        };
        manager.register(ControllerSpec {
            reconciler,
            workers: deps.workers.planes,
            watches: Vec::new(),
            indexes: Vec::new(),
        });
    }

    manager.register(ControllerSpec {
        reconciler: Arc::new(ProjectReconciler::new(store.clone())),
        workers: deps.workers.projects,
        watches: vec![
            // A build plane appearing un-degrades projects pointing at it.
            WatchInterest::new(Kind::BuildPlane, {
                let projects = manager.cache_for(Kind::Project);
                move |object: &Object| {
                    wake_referencing(&projects, "spec.build_plane_ref.name", object)
                }
            }),
        ],
        indexes: vec![IndexSpec::new(Kind::Project, "spec.build_plane_ref.name")],
    });

    manager.register(ControllerSpec {
        reconciler: Arc::new(ComponentReconciler::new(store.clone())),
        workers: deps.workers.components,
        watches: vec![
            // Type edits re-render every component of that type.
            WatchInterest::new(Kind::ComponentType, {
                let components = manager.cache_for(Kind::Component);
                move |object: &Object| {
                    let type_name = object.meta().name.clone();
                    components
                        .list()
                        .into_iter()
                        .filter_map(|candidate| {
                            let Object::Component(component) = candidate else {
                                return None;
                            };
                            let matches = component
                                .type_ref()
                                .is_some_and(|type_ref| type_ref.name == type_name);
                            matches.then(|| component.key())
                        })
                        .collect()
                }
            }),
            // A fresh build's workload re-releases its component.
            WatchInterest::new(Kind::Workload, {
                move |object: &Object| {
                    vec![ObjectKey {
                        kind: Kind::Component,
                        namespace: object.meta().namespace.clone(),
                        name: object.meta().name.clone(),
                    }]
                }
            }),
        ],
        indexes: vec![IndexSpec::new(Kind::ComponentRelease, RELEASE_OWNER_INDEX)],
    });

    manager.register(ControllerSpec {
        reconciler: Arc::new(BindingReconciler::new(
            store.clone(),
            deps.engine.clone(),
            deps.clients.clone(),
            deps.field_owner.clone(),
        )),
        workers: deps.workers.bindings,
        watches: vec![
            // A release landing unblocks bindings referencing it.
            WatchInterest::new(Kind::ComponentRelease, {
                let bindings = manager.cache_for(Kind::ReleaseBinding);
                move |object: &Object| {
                    let Object::ComponentRelease(release) = object else {
                        return Vec::new();
                    };
                    bindings.by_index(BINDING_OWNER_INDEX, &release.spec.owner.name)
                }
            }),
            // Env-settings edits re-render bindings of that pair.
            WatchInterest::new(Kind::EnvSettings, {
                let bindings = manager.cache_for(Kind::ReleaseBinding);
                move |object: &Object| {
                    let Object::EnvSettings(settings) = object else {
                        return Vec::new();
                    };
                    bindings
                        .by_index(BINDING_OWNER_INDEX, &settings.spec.component.name)
                        .into_iter()
                        .filter(|key| {
                            bindings.get(key).is_some_and(|candidate| {
                                matches!(
                                    candidate,
                                    Object::ReleaseBinding(binding)
                                        if binding.spec.environment == settings.spec.environment
                                )
                            })
                        })
                        .collect()
                }
            }),
            // Environment edits re-resolve their bindings.
            WatchInterest::new(Kind::Environment, {
                let bindings = manager.cache_for(Kind::ReleaseBinding);
                move |object: &Object| {
                    bindings.by_index(BINDING_ENVIRONMENT_INDEX, &object.meta().name)
                }
            }),
        ],
        indexes: vec![
            IndexSpec::new(Kind::ReleaseBinding, BINDING_OWNER_INDEX),
            IndexSpec::new(Kind::ReleaseBinding, BINDING_ENVIRONMENT_INDEX),
            IndexSpec::new(Kind::EnvSettings, ENV_SETTINGS_COMPONENT_INDEX),
        ],
    });

    manager.register(ControllerSpec {
        reconciler: Arc::new(EnvSettingsReconciler::new(store.clone())),
        workers: deps.workers.env_settings,
        watches: vec![
            // A snapshot landing for (component, environment) wakes the
            // matching settings object, and only that one.
            WatchInterest::new(Kind::ComponentEnvSnapshot, {
                let settings_cache = manager.cache_for(Kind::EnvSettings);
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
            }),
        ],
        indexes: vec![IndexSpec::new(Kind::EnvSettings, ENV_SETTINGS_COMPONENT_INDEX)],
    });

    manager.register(ControllerSpec {
        reconciler: Arc::new(WorkflowRunReconciler::new(
            store,
            deps.engine.clone(),
            deps.clients.clone(),
            deps.field_owner.clone(),
        )),
        workers: deps.workers.workflow_runs,
        watches: Vec::new(),
        indexes: Vec::new(),
    });
}

/// Keys of env-settings objects matching a (component, environment) pair.
pub fn wake_settings_for(
    settings_cache: &KindCache,
    component: &str,
    environment: &str,
) -> Vec<ObjectKey> {
    settings_cache
        .by_index(ENV_SETTINGS_COMPONENT_INDEX, component)
        .into_iter()
        .filter(|key| {
            settings_cache.get(key).is_some_and(|candidate| {
                matches!(
                    candidate,
                    Object::EnvSettings(settings)
                        if settings.spec.environment == environment
                )
            })
        })
        .collect()
}

/// Keys of cached objects whose indexed field matches the changed
/// object's name.
fn wake_referencing(cache: &KindCache, index_path: &str, changed: &Object) -> Vec<ObjectKey> {
    cache.by_index(index_path, &changed.meta().name)
}
