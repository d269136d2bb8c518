//! Project and Environment resources.

use serde::{Deserialize, Serialize};

use crate::domain::meta::{Condition, ObjectMeta, ResourceRef};

/// Spec of a project: the unit that groups components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSpec {
    /// Name of the deployment pipeline the project promotes through.
    #[serde(default)]
    pub deployment_pipeline: String,
    /// Build plane used by this project's builds, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_plane_ref: Option<ResourceRef>,
}

/// Standard status block for kinds without extra observed fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicStatus {
    /// Spec generation most recently reconciled.
    #[serde(default)]
    pub observed_generation: i64,
    /// Standard condition list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Groups components under one deployment pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: ProjectSpec,
    /// Observed state.
    #[serde(default)]
    pub status: BasicStatus,
}

impl Project {
    /// New project with empty status.
    pub fn new(meta: ObjectMeta, spec: ProjectSpec) -> Self {
        Self {
            meta,
            spec,
            status: BasicStatus::default(),
        }
    }
}

/// Spec of an environment: a deployment target resolved by bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    /// The data plane this environment deploys onto.
    pub data_plane_ref: ResourceRef,
    /// Informational flag; never read by the core.
    #[serde(default)]
    pub is_production: bool,
}

/// A deployment target (dev, staging, prod, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: EnvironmentSpec,
    /// Observed state.
    #[serde(default)]
    pub status: BasicStatus,
}

impl Environment {
    /// New environment with empty status.
    pub fn new(meta: ObjectMeta, spec: EnvironmentSpec) -> Self {
        Self {
            meta,
            spec,
            status: BasicStatus::default(),
        }
    }
}
