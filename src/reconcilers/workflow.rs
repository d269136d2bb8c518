//! Workflow-run reconciler: validates runs, dispatches them to a build
//! plane, and prunes finished runs past their TTL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::domain::errors::{ReconcileError, ReconcileResult, StoreError};
use crate::domain::meta::{ConditionStatus, Kind, ObjectKey, Resource};
use crate::domain::models::{
    BuildPlane, Component, PlaneType, Project, Workflow, WorkflowRun, WorkflowRunPhase,
};
use crate::domain::ports::store::{ListOptions, ResourceStore};
use crate::engine::{TemplateEngine, Value, VarScope};
use crate::planes::{PlaneClientCache, PlaneCoordinates};
use crate::schema::Schema;
use crate::runtime::{
    condition, set_condition, ReconcileOutcome, Reconciler, CONDITION_READY,
};

/// Reconciler for [`WorkflowRun`].
pub struct WorkflowRunReconciler {
    store: Arc<dyn ResourceStore>,
    engine: Arc<TemplateEngine>,
    clients: Arc<PlaneClientCache>,
    field_owner: String,
}

impl WorkflowRunReconciler {
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

    async fn resolve_workflow(&self, run: &WorkflowRun) -> ReconcileResult<Workflow> {
        let key = run
            .spec
            .workflow_ref
            .key_in(run.meta.namespace.as_deref());
        let Some(object) = self.store.get(&key).await? else {
            return Err(ReconcileError::ReferenceMissing {
                path: "spec.workflowRef".to_string(),
                key,
            });
        };
        Ok(object.try_into()?)
    }

    /// Build plane resolution walks component -> project -> buildPlaneRef
    /// for component-sourced runs, and falls back to the sole build plane
    /// in the run's namespace otherwise.
    async fn resolve_build_plane(&self, run: &WorkflowRun) -> ReconcileResult<BuildPlane> {
        if let Some(component_ref) = &run.spec.component {
            let component_key = component_ref.key_in(run.meta.namespace.as_deref());
            let Some(object) = self.store.get(&component_key).await? else {
                return Err(ReconcileError::ReferenceMissing {
                    path: "spec.component".to_string(),
                    key: component_key,
                });
            };
            let component: Component = object.try_into()?;

            let project_key = component
                .spec
                .owner
                .key_in(component.meta.namespace.as_deref());
            let Some(object) = self.store.get(&project_key).await? else {
                return Err(ReconcileError::ReferenceMissing {
                    path: "spec.owner".to_string(),
                    key: project_key,
                });
            };
            let project: Project = object.try_into()?;

            if let Some(build_plane_ref) = &project.spec.build_plane_ref {
                let plane_key = build_plane_ref.key_in(project.meta.namespace.as_deref());
                let Some(object) = self.store.get(&plane_key).await? else {
                    return Err(ReconcileError::ReferenceMissing {
                        path: "spec.buildPlaneRef".to_string(),
                        key: plane_key,
                    });
                };
                return Ok(object.try_into()?);
            }
        }

        let mut planes = self
            .store
            .list(
                Kind::BuildPlane,
                match &run.meta.namespace {
                    Some(namespace) => ListOptions::in_namespace(namespace.clone()),
                    None => ListOptions::all(),
                },
            )
            .await?;
        if planes.len() != 1 {
            return Err(ReconcileError::ReferenceMissing {
                path: "spec.workflowRef".to_string(),
                key: ObjectKey {
                    kind: Kind::BuildPlane,
                    namespace: run.meta.namespace.clone(),
                    name: "<unambiguous build plane>".to_string(),
                },
            });
        }
        Ok(planes.remove(0).try_into()?)
    }

    fn run_scope(run: &WorkflowRun) -> VarScope {
        let mut vars = VarScope::new();
        vars.insert("parameters".to_string(), Value::from(&run.spec.parameters));
        if let Some(system) = &run.spec.system_parameters {
            let doc = serde_json::to_value(system)
                .ok()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or(crate::domain::raw::RawDoc::Null);
            vars.insert("systemParameters".to_string(), Value::from(&doc));
        }
        let mut run_meta = indexmap::IndexMap::new();
        run_meta.insert(
            "name".to_string(),
            Value::String(run.meta.name.clone()),
        );
        vars.insert("run".to_string(), Value::Map(run_meta));
        vars
    }

    async fn dispatch(&self, run: &WorkflowRun, workflow: &Workflow) -> ReconcileResult<()> {
        let build_plane = self.resolve_build_plane(run).await?;
        let rendered = self
            .engine
            .render(&workflow.spec.run_template, &Self::run_scope(run))
            .map_err(|err| {
                if err.is_missing_data() {
                    ReconcileError::Transient(err.to_string())
                } else {
                    ReconcileError::InvalidInput(err.to_string())
                }
            })?;

        let coords = PlaneCoordinates {
            plane_type: PlaneType::Build,
            plane_id: &build_plane.spec.plane_id,
            namespace: build_plane.meta.namespace.as_deref(),
            name: &build_plane.meta.name,
        };
        let client = self
            .clients
            .client(&coords, &build_plane.spec.connection)
            .await
            .map_err(ReconcileError::from)?;
        client
            .apply(&rendered, &self.field_owner)
            .await
            .map_err(ReconcileError::from)?;
        info!(run = %run.meta.name, plane = %build_plane.meta.name, "dispatched workflow run");
        Ok(())
    }

    fn ttl_outcome(run: &WorkflowRun) -> Option<ReconcileOutcome> {
        let Some(ttl) = run.spec.ttl_seconds_after_finished else {
            return Some(ReconcileOutcome::Done);
        };
        // A finished run without a finish stamp waits for the status
        // write that records it; that write re-triggers this reconciler.
        let Some(finished_at) = run.status.finished_at else {
            return Some(ReconcileOutcome::Done);
        };
        let expires_at = finished_at + chrono::Duration::seconds(ttl as i64);
        let now = Utc::now();
        if expires_at <= now {
            None // caller deletes
        } else {
            let remaining = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
            Some(ReconcileOutcome::RequeueAfter(remaining))
        }
    }
}

#[async_trait]
impl Reconciler for WorkflowRunReconciler {
    fn kind(&self) -> Kind {
        Kind::WorkflowRun
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<ReconcileOutcome> {
        let Some(object) = self.store.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        let mut run: WorkflowRun = object
            .try_into()
            .map_err(|err: StoreError| ReconcileError::Fatal(err.to_string()))?;

        if run.meta.is_terminating() {
            return Ok(ReconcileOutcome::Done);
        }

        // Finished runs only wait out their TTL.
        if run.status.phase.is_finished() {
            return match Self::ttl_outcome(&run) {
                Some(outcome) => Ok(outcome),
                None => {
                    debug!(run = %run.meta.name, "pruning expired workflow run");
                    match self.store.delete(key).await {
                        Ok(()) | Err(StoreError::NotFound(_)) => Ok(ReconcileOutcome::Done),
                        Err(err) => Err(err.into()),
                    }
                }
            };
        }

        let workflow = self.resolve_workflow(&run).await?;

        // Validate user parameters against the workflow schema.
        let schema = Schema::parse("parameters", &workflow.spec.schema, None)
            .map_err(|err| ReconcileError::InvalidInput(err.to_string()))?;
        if let Err(errors) = schema.validate("parameters", &run.spec.parameters) {
            let first = errors
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(ReconcileError::InvalidInput(first));
        }

        // Component-sourced runs must carry full repository coordinates.
        if run.spec.component.is_some() {
            let Some(system) = &run.spec.system_parameters else {
                return Err(ReconcileError::InvalidInput(
                    "systemParameters: required for component workflow runs".to_string(),
                ));
            };
            if let Err(path) = system.validate() {
                return Err(ReconcileError::InvalidInput(format!(
                    "{path}: required field is missing"
                )));
            }
        }

        let mut changed = false;
        if run.status.phase == WorkflowRunPhase::Pending {
            self.dispatch(&run, &workflow).await?;
            run.status.phase = WorkflowRunPhase::Running;
            changed = true;
        }

        let generation = run.meta.generation;
        if run.observed_generation() != generation {
            run.set_observed_generation(generation);
            changed = true;
        }
        changed |= set_condition(
            run.conditions_mut(),
            condition(
                CONDITION_READY,
                ConditionStatus::True,
                "Dispatched",
                "run dispatched to build plane",
                generation,
            ),
        );

        if changed {
            match self.store.update_status(run.into()).await {
                Ok(_) => {}
                Err(err) if err.is_conflict() => return Ok(ReconcileOutcome::Requeue),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(ReconcileOutcome::Done)
    }
}
