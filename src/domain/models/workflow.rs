//! Workflow template and run resources.
//!
//! A `Workflow` is a template (schema + opaque run template); a
//! `WorkflowRun` instantiates it with parameter values. Runs created for a
//! component build additionally carry `SystemParameters` naming the
//! repository coordinates; that richer shape is the only one accepted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::meta::{Condition, ObjectMeta, ResourceRef};
use crate::domain::raw::RawDoc;

use super::project::BasicStatus;

/// Spec of a workflow template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Parameter schema for runs of this workflow.
    #[serde(default)]
    pub schema: RawDoc,
    /// Opaque run template handed to the build plane; expanded with the
    /// run's parameter values.
    #[serde(default)]
    pub run_template: RawDoc,
}

/// Workflow template resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: WorkflowSpec,
    /// Observed state.
    #[serde(default)]
    pub status: BasicStatus,
}

impl Workflow {
    /// New workflow with empty status.
    pub fn new(meta: ObjectMeta, spec: WorkflowSpec) -> Self {
        Self {
            meta,
            spec,
            status: BasicStatus::default(),
        }
    }
}

/// Source revision selector inside [`SystemRepository`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRevision {
    /// Branch to build. Required.
    #[serde(default)]
    pub branch: String,
    /// Commit pin, when the run is for an exact revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// Repository coordinates of a component-sourced run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemRepository {
    /// Clone URL. Required.
    #[serde(default)]
    pub url: String,
    /// Revision selector. `branch` is required.
    #[serde(default)]
    pub revision: RepositoryRevision,
    /// Path of the component inside the repository. Required.
    #[serde(default)]
    pub app_path: String,
}

/// Parameters injected by the platform (not the user) into component runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemParameters {
    /// Repository coordinates.
    #[serde(default)]
    pub repository: SystemRepository,
}

impl SystemParameters {
    /// Validate the required coordinates, returning the offending JSON
    /// path on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.repository.url.is_empty() {
            return Err("systemParameters.repository.url".to_string());
        }
        if self.repository.revision.branch.is_empty() {
            return Err("systemParameters.repository.revision.branch".to_string());
        }
        if self.repository.app_path.is_empty() {
            return Err("systemParameters.repository.appPath".to_string());
        }
        Ok(())
    }
}

/// Spec of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunSpec {
    /// Workflow template being instantiated.
    pub workflow_ref: ResourceRef,
    /// User-supplied parameter values, validated against the workflow
    /// schema.
    #[serde(default)]
    pub parameters: RawDoc,
    /// Component this run builds, for component-sourced runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ResourceRef>,
    /// Platform-injected repository coordinates; required when `component`
    /// is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_parameters: Option<SystemParameters>,
    /// Seconds to keep the run after it finishes; pruned afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<u64>,
}

/// Observed phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowRunPhase {
    /// Not yet dispatched to a build plane.
    Pending,
    /// Dispatched and executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with failure.
    Failed,
}

impl Default for WorkflowRunPhase {
    fn default() -> Self {
        Self::Pending
    }
}

impl WorkflowRunPhase {
    /// Whether the run has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Observed state of one task inside a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTaskStatus {
    /// Task name inside the run template.
    pub name: String,
    /// Phase reported by the build plane.
    #[serde(default)]
    pub phase: String,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
}

/// Status of a workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunStatus {
    /// Spec generation most recently reconciled.
    #[serde(default)]
    pub observed_generation: i64,
    /// Standard condition list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Observed run phase.
    #[serde(default)]
    pub phase: WorkflowRunPhase,
    /// Per-task observations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<WorkflowTaskStatus>,
    /// When the run finished; drives TTL pruning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// One instantiation of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: WorkflowRunSpec,
    /// Observed state.
    #[serde(default)]
    pub status: WorkflowRunStatus,
}

impl WorkflowRun {
    /// New run with empty status.
    pub fn new(meta: ObjectMeta, spec: WorkflowRunSpec) -> Self {
        Self {
            meta,
            spec,
            status: WorkflowRunStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_parameters_required_paths() {
        let mut params = SystemParameters::default();
        assert_eq!(
            params.validate().unwrap_err(),
            "systemParameters.repository.url"
        );

        params.repository.url = "https://git.example.com/shop.git".into();
        assert_eq!(
            params.validate().unwrap_err(),
            "systemParameters.repository.revision.branch"
        );

        params.repository.revision.branch = "main".into();
        assert_eq!(
            params.validate().unwrap_err(),
            "systemParameters.repository.appPath"
        );

        params.repository.app_path = "services/checkout".into();
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_phase_terminality() {
        assert!(!WorkflowRunPhase::Pending.is_finished());
        assert!(!WorkflowRunPhase::Running.is_finished());
        assert!(WorkflowRunPhase::Succeeded.is_finished());
        assert!(WorkflowRunPhase::Failed.is_finished());
    }
}
