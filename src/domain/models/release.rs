//! Immutable release and snapshot resources.
//!
//! A release freezes everything rendering needs at the moment it is cut;
//! re-rendering for any environment happens from the frozen copy, so later
//! edits to the component type have no retroactive effect.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::meta::{ObjectMeta, ResourceRef};
use crate::domain::raw::RawDoc;

use super::component::{ComponentTypeSpec, TraitDefSpec, WorkloadSpec};
use super::project::BasicStatus;

/// Spec of a component release: the frozen rendering inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentReleaseSpec {
    /// Component this release was cut from.
    pub owner: ResourceRef,
    /// Verbatim component type spec at release time.
    pub component_type: ComponentTypeSpec,
    /// Verbatim trait specs at release time, keyed by trait name.
    #[serde(default)]
    pub traits: IndexMap<String, TraitDefSpec>,
    /// Verbatim workload spec at release time.
    #[serde(default)]
    pub workload: WorkloadSpec,
    /// Component parameter values at release time.
    #[serde(default)]
    pub parameters: RawDoc,
    /// Component-level trait instances at release time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trait_instances: Vec<super::component::TraitInstance>,
}

/// Immutable freeze of type + traits + workload + values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRelease {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Frozen content; never mutated after creation.
    pub spec: ComponentReleaseSpec,
    /// Observed state.
    #[serde(default)]
    pub status: BasicStatus,
}

impl ComponentRelease {
    /// New release with empty status.
    pub fn new(meta: ObjectMeta, spec: ComponentReleaseSpec) -> Self {
        Self {
            meta,
            spec,
            status: BasicStatus::default(),
        }
    }
}

/// Spec of a per-environment snapshot: a release plus the env-level
/// overrides captured when the binding materialized it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentEnvSnapshotSpec {
    /// Component the snapshot belongs to.
    pub component: ResourceRef,
    /// Environment the snapshot targets.
    pub environment: String,
    /// Release the snapshot was taken from.
    pub release_name: String,
    /// Env-level overrides captured at snapshot time.
    #[serde(default)]
    pub env_overrides: RawDoc,
}

/// Immutable per-environment rendering input snapshot. Owned by a binding,
/// referencing a release by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentEnvSnapshot {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Frozen content; never mutated after creation.
    pub spec: ComponentEnvSnapshotSpec,
    /// Observed state.
    #[serde(default)]
    pub status: BasicStatus,
}

impl ComponentEnvSnapshot {
    /// New snapshot with empty status.
    pub fn new(meta: ObjectMeta, spec: ComponentEnvSnapshotSpec) -> Self {
        Self {
            meta,
            spec,
            status: BasicStatus::default(),
        }
    }
}
