//! Binding and environment-settings resources.
//!
//! A binding targets exactly one (component, environment) pair and names
//! the release to materialize there. `owner` and `environment` are
//! immutable after creation; admission enforces at most one binding per
//! pair.

use serde::{Deserialize, Serialize};

use crate::domain::meta::{Condition, ObjectMeta, ResourceRef};
use crate::domain::raw::RawDoc;

use super::project::BasicStatus;

/// Desired lifecycle state of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingState {
    /// Resources are rendered and applied.
    Active,
    /// Resources stay applied but workloads are scaled to zero.
    Suspend,
    /// Resources are removed from the target plane.
    Undeploy,
}

impl Default for BindingState {
    fn default() -> Self {
        Self::Active
    }
}

impl BindingState {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspend => "suspend",
            Self::Undeploy => "undeploy",
        }
    }
}

/// Spec of a release binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseBindingSpec {
    /// Owning component. Immutable after creation.
    pub owner: ResourceRef,
    /// Target environment name. Immutable after creation.
    pub environment: String,
    /// Name of the `ComponentRelease` to materialize.
    pub release_name: String,
    /// Environment-scoped override values layered over the release.
    #[serde(default)]
    pub overrides: RawDoc,
    /// Desired lifecycle state.
    #[serde(default)]
    pub state: BindingState,
}

/// Binding status beyond the standard block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseBindingStatus {
    /// Spec generation most recently reconciled.
    #[serde(default)]
    pub observed_generation: i64,
    /// Standard condition list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// Name of the env snapshot currently materialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
}

/// Targets one (component, environment) to materialize a release there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseBinding {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: ReleaseBindingSpec,
    /// Observed state.
    #[serde(default)]
    pub status: ReleaseBindingStatus,
}

impl ReleaseBinding {
    /// New binding with empty status.
    pub fn new(meta: ObjectMeta, spec: ReleaseBindingSpec) -> Self {
        Self {
            meta,
            spec,
            status: ReleaseBindingStatus::default(),
        }
    }
}

/// Spec of per-(component, environment) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSettingsSpec {
    /// Component the settings apply to.
    pub component: ResourceRef,
    /// Environment the settings apply in.
    pub environment: String,
    /// Override values merged into rendering for this environment.
    #[serde(default)]
    pub overrides: RawDoc,
}

/// Environment-scoped override document for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSettings {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: EnvSettingsSpec,
    /// Observed state.
    #[serde(default)]
    pub status: BasicStatus,
}

impl EnvSettings {
    /// New settings object with empty status.
    pub fn new(meta: ObjectMeta, spec: EnvSettingsSpec) -> Self {
        Self {
            meta,
            spec,
            status: BasicStatus::default(),
        }
    }
}
