//! Component reconciler: resolves the component's type, traits, and
//! workload, and cuts immutable releases.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::domain::errors::{ReconcileError, ReconcileResult, StoreError};
use crate::domain::meta::{ConditionStatus, Kind, ObjectKey, Resource};
use crate::domain::models::{Component, ComponentType, TraitDef, Workload};
use crate::domain::ports::store::{ListOptions, ResourceStore};
use crate::runtime::{
    condition, ensure_finalizer, remove_finalizer, set_condition, ReconcileOutcome, Reconciler,
    CONDITION_READY,
};

/// Finalizer owned by the component reconciler.
pub const COMPONENT_FINALIZER: &str = "formation.dev/component-releases";

/// Index path locating releases owned by a component.
pub const RELEASE_OWNER_INDEX: &str = "spec.owner.name";

/// Reconciler for [`Component`].
pub struct ComponentReconciler {
    store: Arc<dyn ResourceStore>,
}

impl ComponentReconciler {
    /// New reconciler over the store.
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    async fn finalize(&self, component: Component) -> ReconcileResult<ReconcileOutcome> {
        // A component exclusively owns its releases; they go first.
        let releases = self
            .store
            .list(
                Kind::ComponentRelease,
                ListOptions::matching(RELEASE_OWNER_INDEX, component.meta.name.clone()),
            )
            .await?;
        for release in &releases {
            debug!(release = %release.meta().name, "deleting owned release");
            match self.store.delete(&release.object_key()).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        if !releases.is_empty() {
            // Observe the deletions on the next pass before dropping the
            // finalizer.
            return Ok(ReconcileOutcome::Requeue);
        }

        remove_finalizer(&self.store, &component.into(), COMPONENT_FINALIZER).await?;
        Ok(ReconcileOutcome::Done)
    }

    async fn resolve_type(&self, component: &Component) -> ReconcileResult<ComponentType> {
        let Some(type_ref) = component.type_ref() else {
            return Err(ReconcileError::InvalidInput(format!(
                "spec.componentType: {:?} is not workloadType/name",
                component.spec.component_type
            )));
        };
        let key = ObjectKey {
            kind: Kind::ComponentType,
            namespace: component.meta.namespace.clone(),
            name: type_ref.name.clone(),
        };
        let Some(object) = self.store.get(&key).await? else {
            return Err(ReconcileError::ReferenceMissing {
                path: "spec.componentType".to_string(),
                key,
            });
        };
        let component_type: ComponentType = object.try_into()?;
        if component_type.spec.workload_type != type_ref.workload_type {
            return Err(ReconcileError::InvalidInput(format!(
                "spec.componentType: type {:?} renders workload type {:?}, not {:?}",
                type_ref.name, component_type.spec.workload_type, type_ref.workload_type
            )));
        }
        Ok(component_type)
    }

    async fn resolve_traits(
        &self,
        component: &Component,
        component_type: &ComponentType,
    ) -> ReconcileResult<IndexMap<String, TraitDef>> {
        let mut out = IndexMap::new();
        let wanted = component_type
            .spec
            .embedded_traits
            .iter()
            .chain(component.spec.traits.iter());
        for instance in wanted {
            if out.contains_key(&instance.name) {
                continue;
            }
            let key = ObjectKey {
                kind: Kind::TraitDef,
                namespace: component.meta.namespace.clone(),
                name: instance.name.clone(),
            };
            let Some(object) = self.store.get(&key).await? else {
                return Err(ReconcileError::ReferenceMissing {
                    path: format!("spec.traits[{}]", instance.instance_name),
                    key,
                });
            };
            let trait_def: TraitDef = object.try_into()?;
            out.insert(instance.name.clone(), trait_def);
        }
        Ok(out)
    }

    /// The workload carries the component's name; before the first build
    /// completes there is none, and rendering proceeds against an empty
    /// spec (templates that need containers fail as missing data and
    /// retry once the build lands).
    async fn resolve_workload(&self, component: &Component) -> ReconcileResult<Workload> {
        let key = ObjectKey {
            kind: Kind::Workload,
            namespace: component.meta.namespace.clone(),
            name: component.meta.name.clone(),
        };
        match self.store.get(&key).await? {
            Some(object) => Ok(object.try_into()?),
            None => Ok(Workload::new(
                crate::domain::meta::ObjectMeta {
                    name: component.meta.name.clone(),
                    namespace: component.meta.namespace.clone(),
                    ..Default::default()
                },
                Default::default(),
            )),
        }
    }

    async fn observe(&self, component: Component) -> ReconcileResult<ReconcileOutcome> {
        let object =
            ensure_finalizer(&self.store, &component.clone().into(), COMPONENT_FINALIZER).await?;
        let mut component: Component = object.try_into()?;

        let component_type = self.resolve_type(&component).await?;
        let traits = self.resolve_traits(&component, &component_type).await?;
        let workload = self.resolve_workload(&component).await?;

        let mut release_cut = None;
        if component.spec.auto_deploy {
            let release =
                crate::render::cut_release(&component, &component_type, &traits, &workload);
            let release_name = release.meta.name.clone();
            if component.status.latest_release.as_deref() != Some(release_name.as_str()) {
                match self.store.create(release.into()).await {
                    Ok(_) => info!(release = %release_name, "cut component release"),
                    // Identical inputs reuse the existing release.
                    Err(StoreError::AlreadyExists(_)) => {}
                    Err(err) => return Err(err.into()),
                }
                release_cut = Some(release_name);
            }
        }

        let generation = component.meta.generation;
        let mut changed = false;
        if let Some(release_name) = release_cut {
            component.status.latest_release = Some(release_name);
            changed = true;
        }
        if component.observed_generation() != generation {
            component.set_observed_generation(generation);
            changed = true;
        }
        changed |= set_condition(
            component.conditions_mut(),
            condition(
                CONDITION_READY,
                ConditionStatus::True,
                "Reconciled",
                "component resolved and released",
                generation,
            ),
        );

        if changed {
            match self.store.update_status(component.into()).await {
                Ok(_) => {}
                Err(err) if err.is_conflict() => return Ok(ReconcileOutcome::Requeue),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(ReconcileOutcome::Done)
    }
}

#[async_trait]
impl Reconciler for ComponentReconciler {
    fn kind(&self) -> Kind {
        Kind::Component
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<ReconcileOutcome> {
        let Some(object) = self.store.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        let component: Component = object
            .try_into()
            .map_err(|err: StoreError| ReconcileError::Fatal(err.to_string()))?;

        if component.meta.is_terminating() {
            self.finalize(component).await
        } else {
            self.observe(component).await
        }
    }
}
