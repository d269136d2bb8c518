//! Project reconciler: validates the pipeline reference and the optional
//! build plane.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{ReconcileError, ReconcileResult, StoreError};
use crate::domain::meta::{ConditionStatus, Kind, ObjectKey, Resource};
use crate::domain::models::Project;
use crate::domain::ports::store::ResourceStore;
use crate::runtime::{
    condition, set_condition, ReconcileOutcome, Reconciler, CONDITION_READY,
};

/// Reconciler for [`Project`].
pub struct ProjectReconciler {
    store: Arc<dyn ResourceStore>,
}

impl ProjectReconciler {
    /// New reconciler over the store.
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Reconciler for ProjectReconciler {
    fn kind(&self) -> Kind {
        Kind::Project
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<ReconcileOutcome> {
        let Some(object) = self.store.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        let mut project: Project = object
            .try_into()
            .map_err(|err: StoreError| ReconcileError::Fatal(err.to_string()))?;

        if project.meta.is_terminating() {
            return Ok(ReconcileOutcome::Done);
        }

        if project.spec.deployment_pipeline.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "spec.deploymentPipeline: must not be empty".to_string(),
            ));
        }

        if let Some(build_plane_ref) = &project.spec.build_plane_ref {
            let key = build_plane_ref.key_in(project.meta.namespace.as_deref());
            if self.store.get(&key).await?.is_none() {
                return Err(ReconcileError::ReferenceMissing {
                    path: "spec.buildPlaneRef".to_string(),
                    key,
                });
            }
        }

        let generation = project.meta.generation;
        let mut changed = false;
        if project.observed_generation() != generation {
            project.set_observed_generation(generation);
            changed = true;
        }
        changed |= set_condition(
            project.conditions_mut(),
            condition(
                CONDITION_READY,
                ConditionStatus::True,
                "Reconciled",
                "project references resolved",
                generation,
            ),
        );

        if changed {
            match self.store.update_status(project.into()).await {
                Ok(_) => {}
                Err(err) if err.is_conflict() => return Ok(ReconcileOutcome::Requeue),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(ReconcileOutcome::Done)
    }
}
