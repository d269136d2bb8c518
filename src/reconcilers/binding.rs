//! Release-binding reconciler: materializes a frozen release into one
//! environment.
//!
//! Resolves the environment and its data plane, folds env-settings and
//! binding overrides into an immutable env snapshot, renders from the
//! frozen release, and applies the result through the cached plane
//! client.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::errors::{ReconcileError, ReconcileResult, StoreError};
use crate::domain::meta::{ConditionStatus, Kind, ObjectKey, Resource};
use crate::domain::models::{
    BindingState, ComponentRelease, DataPlane, Environment, EnvSettings, Object, PlaneType,
    ReleaseBinding,
};
use crate::domain::ports::cluster::RemoteCoordinates;
use crate::domain::ports::store::{ListOptions, ResourceStore};
use crate::domain::raw::RawDoc;
use crate::engine::TemplateEngine;
use crate::planes::{PlaneClientCache, PlaneCoordinates};
use crate::render::{self, merge_layers, RenderOutput};
use crate::runtime::{
    condition, ensure_finalizer, remove_finalizer, set_condition, ReconcileOutcome, Reconciler,
    CONDITION_READY,
};

/// Finalizer owned by the binding reconciler.
pub const BINDING_FINALIZER: &str = "formation.dev/binding-resources";

/// Index path locating env settings by component name.
pub const ENV_SETTINGS_COMPONENT_INDEX: &str = "spec.component.name";

/// Index path locating bindings by component name.
pub const BINDING_OWNER_INDEX: &str = "spec.owner.name";

/// Index path locating bindings by environment.
pub const BINDING_ENVIRONMENT_INDEX: &str = "spec.environment";

/// Reconciler for [`ReleaseBinding`].
pub struct BindingReconciler {
    store: Arc<dyn ResourceStore>,
    engine: Arc<TemplateEngine>,
    clients: Arc<PlaneClientCache>,
    field_owner: String,
}

impl BindingReconciler {
    /// New reconciler.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        engine: Arc<TemplateEngine>,
        clients: Arc<PlaneClientCache>,
        field_owner: impl Into<String>,
    ) -> Self {
        Self {
            store,
            engine,
            clients,
            field_owner: field_owner.into(),
        }
    }

    async fn resolve_environment(&self, binding: &ReleaseBinding) -> ReconcileResult<Environment> {
        let key = ObjectKey {
            kind: Kind::Environment,
            namespace: binding.meta.namespace.clone(),
            name: binding.spec.environment.clone(),
        };
        let Some(object) = self.store.get(&key).await? else {
            return Err(ReconcileError::ReferenceMissing {
                path: "spec.environment".to_string(),
                key,
            });
        };
        Ok(object.try_into()?)
    }

    async fn resolve_data_plane(&self, environment: &Environment) -> ReconcileResult<DataPlane> {
        let key = environment
            .spec
            .data_plane_ref
            .key_in(environment.meta.namespace.as_deref());
        let Some(object) = self.store.get(&key).await? else {
            return Err(ReconcileError::ReferenceMissing {
                path: "spec.dataPlaneRef".to_string(),
                key,
            });
        };
        Ok(object.try_into()?)
    }

    async fn resolve_release(&self, binding: &ReleaseBinding) -> ReconcileResult<ComponentRelease> {
        let key = ObjectKey {
            kind: Kind::ComponentRelease,
            namespace: binding.meta.namespace.clone(),
            name: binding.spec.release_name.clone(),
        };
        let Some(object) = self.store.get(&key).await? else {
            return Err(ReconcileError::ReferenceMissing {
                path: "spec.releaseName".to_string(),
                key,
            });
        };
        Ok(object.try_into()?)
    }

    /// Env-settings overrides for this (component, environment), folded
    /// under the binding's own overrides.
    async fn effective_overrides(&self, binding: &ReleaseBinding) -> ReconcileResult<RawDoc> {
        let settings = self
            .store
            .list(
                Kind::EnvSettings,
                ListOptions::matching(
                    ENV_SETTINGS_COMPONENT_INDEX,
                    binding.spec.owner.name.clone(),
                ),
            )
            .await?;
        let mut layers = Vec::new();
        for object in &settings {
            let Object::EnvSettings(EnvSettings { spec, .. }) = object else {
                continue;
            };
            if spec.environment == binding.spec.environment {
                layers.push(&spec.overrides);
            }
        }
        layers.push(&binding.spec.overrides);
        Ok(merge_layers(&layers))
    }

    async fn render_release(
        &self,
        binding: &ReleaseBinding,
        release: &ComponentRelease,
        env_overrides: &RawDoc,
    ) -> ReconcileResult<RenderOutput> {
        let request = render::request_from_release(
            release,
            Some(binding.spec.environment.as_str()),
            env_overrides,
        );
        render::render(&self.engine, &request).map_err(ReconcileError::from)
    }

    async fn apply_resources(
        &self,
        data_plane: &DataPlane,
        output: &RenderOutput,
    ) -> ReconcileResult<usize> {
        let coords = PlaneCoordinates {
            plane_type: PlaneType::Data,
            plane_id: &data_plane.spec.plane_id,
            namespace: data_plane.meta.namespace.as_deref(),
            name: &data_plane.meta.name,
        };
        let client = self
            .clients
            .client(&coords, &data_plane.spec.connection)
            .await
            .map_err(ReconcileError::from)?;
        for resource in &output.resources {
            client
                .apply(&resource.resource, &self.field_owner)
                .await
                .map_err(ReconcileError::from)?;
        }
        Ok(output.resources.len())
    }

    async fn delete_resources(
        &self,
        data_plane: &DataPlane,
        output: &RenderOutput,
    ) -> ReconcileResult<()> {
        let coords = PlaneCoordinates {
            plane_type: PlaneType::Data,
            plane_id: &data_plane.spec.plane_id,
            namespace: data_plane.meta.namespace.as_deref(),
            name: &data_plane.meta.name,
        };
        let client = self
            .clients
            .client(&coords, &data_plane.spec.connection)
            .await
            .map_err(ReconcileError::from)?;
        for resource in &output.resources {
            if let Some(remote) = remote_coordinates(&resource.resource) {
                client.delete(&remote).await.map_err(ReconcileError::from)?;
            }
        }
        Ok(())
    }

    async fn finalize(&self, binding: ReleaseBinding) -> ReconcileResult<ReconcileOutcome> {
        // Undeploy remote resources when everything still resolves; a
        // dismantled environment (release or plane already gone) cannot
        // block deletion forever.
        match self.undeploy_for_finalize(&binding).await {
            Ok(()) => {}
            Err(err @ ReconcileError::Transient(_)) => return Err(err),
            Err(err) => {
                debug!(binding = %binding.meta.name, error = %err, "skipping remote cleanup");
            }
        }

        // Snapshots owned by this binding go before the finalizer.
        let snapshots = self
            .store
            .list(
                Kind::ComponentEnvSnapshot,
                ListOptions::matching(ENV_SETTINGS_COMPONENT_INDEX, binding.spec.owner.name.clone()),
            )
            .await?;
        for snapshot in &snapshots {
            let Object::ComponentEnvSnapshot(inner) = snapshot else {
                continue;
            };
            if inner.spec.environment == binding.spec.environment {
                match self.store.delete(&snapshot.object_key()).await {
                    Ok(()) | Err(StoreError::NotFound(_)) => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }

        remove_finalizer(&self.store, &binding.into(), BINDING_FINALIZER).await?;
        Ok(ReconcileOutcome::Done)
    }

    async fn undeploy_for_finalize(&self, binding: &ReleaseBinding) -> ReconcileResult<()> {
        let environment = self.resolve_environment(binding).await?;
        let data_plane = self.resolve_data_plane(&environment).await?;
        let release = self.resolve_release(binding).await?;
        let overrides = self.effective_overrides(binding).await?;
        let output = self.render_release(binding, &release, &overrides).await?;
        self.delete_resources(&data_plane, &output).await
    }

    async fn observe(&self, binding: ReleaseBinding) -> ReconcileResult<ReconcileOutcome> {
        let object =
            ensure_finalizer(&self.store, &binding.clone().into(), BINDING_FINALIZER).await?;
        let mut binding: ReleaseBinding = object.try_into()?;

        let environment = self.resolve_environment(&binding).await?;
        let data_plane = self.resolve_data_plane(&environment).await?;
        let release = self.resolve_release(&binding).await?;
        let overrides = self.effective_overrides(&binding).await?;

        // The snapshot freezes exactly what this binding materializes.
        let snapshot = render::cut_env_snapshot(&binding, &release, overrides.clone());
        let snapshot_name = snapshot.meta.name.clone();
        if binding.status.snapshot_name.as_deref() != Some(snapshot_name.as_str()) {
            match self.store.create(snapshot.into()).await {
                Ok(_) => debug!(snapshot = %snapshot_name, "captured env snapshot"),
                Err(StoreError::AlreadyExists(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let output = self.render_release(&binding, &release, &overrides).await?;
        let (reason, message) = match binding.spec.state {
            BindingState::Active => {
                let applied = self.apply_resources(&data_plane, &output).await?;
                info!(binding = %binding.meta.name, applied, "applied release resources");
                ("Applied", format!("{applied} resource(s) applied"))
            }
            BindingState::Suspend => ("Suspended", "binding suspended".to_string()),
            BindingState::Undeploy => {
                self.delete_resources(&data_plane, &output).await?;
                ("Undeployed", "resources removed from plane".to_string())
            }
        };

        let generation = binding.meta.generation;
        let mut changed = false;
        if binding.status.snapshot_name.as_deref() != Some(snapshot_name.as_str()) {
            binding.status.snapshot_name = Some(snapshot_name);
            changed = true;
        }
        if binding.observed_generation() != generation {
            binding.set_observed_generation(generation);
            changed = true;
        }
        changed |= set_condition(
            binding.conditions_mut(),
            condition(
                CONDITION_READY,
                ConditionStatus::True,
                reason,
                message,
                generation,
            ),
        );

        if changed {
            match self.store.update_status(binding.into()).await {
                Ok(_) => {}
                Err(err) if err.is_conflict() => return Ok(ReconcileOutcome::Requeue),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(ReconcileOutcome::Done)
    }
}

/// Remote identity of a rendered resource, when it names one.
fn remote_coordinates(resource: &RawDoc) -> Option<RemoteCoordinates> {
    let kind = resource.lookup("kind")?.as_str()?.to_string();
    let name = resource.lookup("metadata.name")?.as_str()?.to_string();
    let namespace = resource
        .lookup("metadata.namespace")
        .and_then(RawDoc::as_str)
        .map(str::to_string);
    Some(RemoteCoordinates {
        kind,
        namespace,
        name,
    })
}

#[async_trait]
impl Reconciler for BindingReconciler {
    fn kind(&self) -> Kind {
        Kind::ReleaseBinding
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<ReconcileOutcome> {
        let Some(object) = self.store.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        let binding: ReleaseBinding = object
            .try_into()
            .map_err(|err: StoreError| ReconcileError::Fatal(err.to_string()))?;

        if binding.meta.is_terminating() {
            self.finalize(binding).await
        } else {
            self.observe(binding).await
        }
    }
}
