//! Domain models: every kind held in the control-plane store.
//!
//! Kinds are dispatched explicitly through the [`Object`] enum rather than
//! reflection; reconcilers downcast with `TryFrom<Object>` and the runtime
//! registry keeps one handler per [`Kind`].

mod binding;
mod component;
mod plane;
mod project;
mod release;
mod workflow;

pub use binding::{
    BindingState, EnvSettings, EnvSettingsSpec, ReleaseBinding, ReleaseBindingSpec,
    ReleaseBindingStatus,
};
pub use component::{
    BuildConfig, Component, ComponentSchema, ComponentSpec, ComponentStatus, ComponentType,
    ComponentTypeSpec, ResourceTemplate, TraitDef, TraitDefSpec, TraitInstance, TypeRef,
    ValidationRule, Workload, WorkloadSpec, PROXY_WORKLOAD_TYPE,
};
pub use plane::{
    AgentConnection, BuildPlane, BuildPlaneSpec, DataPlane, DataPlaneSpec, ObservabilityPlane,
    ObservabilityPlaneSpec, PlaneStatus, PlaneType,
};
pub use project::{BasicStatus, Environment, EnvironmentSpec, Project, ProjectSpec};
pub use release::{
    ComponentEnvSnapshot, ComponentEnvSnapshotSpec, ComponentRelease, ComponentReleaseSpec,
};
pub use workflow::{
    RepositoryRevision, SystemParameters, SystemRepository, Workflow, WorkflowRun,
    WorkflowRunPhase, WorkflowRunSpec, WorkflowRunStatus, WorkflowSpec, WorkflowTaskStatus,
};

use serde::{Deserialize, Serialize};

use super::meta::{Condition, Kind, ObjectKey, ObjectMeta, Resource};

/// Type-erased stored object, tagged by kind on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Object {
    /// See [`DataPlane`].
    DataPlane(DataPlane),
    /// See [`BuildPlane`].
    BuildPlane(BuildPlane),
    /// See [`ObservabilityPlane`].
    ObservabilityPlane(ObservabilityPlane),
    /// See [`Project`].
    Project(Project),
    /// See [`Environment`].
    Environment(Environment),
    /// See [`Component`].
    Component(Component),
    /// See [`ComponentType`].
    ComponentType(ComponentType),
    /// See [`TraitDef`].
    TraitDef(TraitDef),
    /// See [`Workload`].
    Workload(Workload),
    /// See [`EnvSettings`].
    EnvSettings(EnvSettings),
    /// See [`ReleaseBinding`].
    ReleaseBinding(ReleaseBinding),
    /// See [`ComponentRelease`].
    ComponentRelease(ComponentRelease),
    /// See [`ComponentEnvSnapshot`].
    ComponentEnvSnapshot(ComponentEnvSnapshot),
    /// See [`Workflow`].
    Workflow(Workflow),
    /// See [`WorkflowRun`].
    WorkflowRun(WorkflowRun),
}

/// Implements [`Resource`] plus `Object` conversions for a concrete kind.
///
/// Every model struct exposes `meta` and a status struct with
/// `observed_generation` and `conditions` fields; the macro wires those into
/// the uniform capability surface the runtime consumes.
macro_rules! impl_resource {
    ($variant:ident, $ty:ty) => {
        impl Resource for $ty {
            const KIND: Kind = Kind::$variant;

            fn meta(&self) -> &ObjectMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.meta
            }

            fn observed_generation(&self) -> i64 {
                self.status.observed_generation
            }

            fn set_observed_generation(&mut self, generation: i64) {
                self.status.observed_generation = generation;
            }

            fn conditions(&self) -> &[Condition] {
                &self.status.conditions
            }

            fn conditions_mut(&mut self) -> &mut Vec<Condition> {
                &mut self.status.conditions
            }
        }

        impl From<$ty> for Object {
            fn from(value: $ty) -> Self {
                Object::$variant(value)
            }
        }

        impl TryFrom<Object> for $ty {
            type Error = crate::domain::errors::StoreError;

            fn try_from(value: Object) -> Result<Self, Self::Error> {
                match value {
                    Object::$variant(inner) => Ok(inner),
                    other => Err(crate::domain::errors::StoreError::KindMismatch {
                        expected: Kind::$variant.as_str(),
                        got: other.kind().as_str(),
                    }),
                }
            }
        }
    };
}

impl_resource!(DataPlane, DataPlane);
impl_resource!(BuildPlane, BuildPlane);
impl_resource!(ObservabilityPlane, ObservabilityPlane);
impl_resource!(Project, Project);
impl_resource!(Environment, Environment);
impl_resource!(Component, Component);
impl_resource!(ComponentType, ComponentType);
impl_resource!(TraitDef, TraitDef);
impl_resource!(Workload, Workload);
impl_resource!(EnvSettings, EnvSettings);
impl_resource!(ReleaseBinding, ReleaseBinding);
impl_resource!(ComponentRelease, ComponentRelease);
impl_resource!(ComponentEnvSnapshot, ComponentEnvSnapshot);
impl_resource!(Workflow, Workflow);
impl_resource!(WorkflowRun, WorkflowRun);

macro_rules! object_dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            Object::DataPlane($inner) => $body,
            Object::BuildPlane($inner) => $body,
            Object::ObservabilityPlane($inner) => $body,
            Object::Project($inner) => $body,
            Object::Environment($inner) => $body,
            Object::Component($inner) => $body,
            Object::ComponentType($inner) => $body,
            Object::TraitDef($inner) => $body,
            Object::Workload($inner) => $body,
            Object::EnvSettings($inner) => $body,
            Object::ReleaseBinding($inner) => $body,
            Object::ComponentRelease($inner) => $body,
            Object::ComponentEnvSnapshot($inner) => $body,
            Object::Workflow($inner) => $body,
            Object::WorkflowRun($inner) => $body,
        }
    };
}

impl Object {
    /// The kind tag of the wrapped resource.
    pub fn kind(&self) -> Kind {
        match self {
            Self::DataPlane(_) => Kind::DataPlane,
            Self::BuildPlane(_) => Kind::BuildPlane,
            Self::ObservabilityPlane(_) => Kind::ObservabilityPlane,
            Self::Project(_) => Kind::Project,
            Self::Environment(_) => Kind::Environment,
            Self::Component(_) => Kind::Component,
            Self::ComponentType(_) => Kind::ComponentType,
            Self::TraitDef(_) => Kind::TraitDef,
            Self::Workload(_) => Kind::Workload,
            Self::EnvSettings(_) => Kind::EnvSettings,
            Self::ReleaseBinding(_) => Kind::ReleaseBinding,
            Self::ComponentRelease(_) => Kind::ComponentRelease,
            Self::ComponentEnvSnapshot(_) => Kind::ComponentEnvSnapshot,
            Self::Workflow(_) => Kind::Workflow,
            Self::WorkflowRun(_) => Kind::WorkflowRun,
        }
    }

    /// Borrow the wrapped object's metadata.
    pub fn meta(&self) -> &ObjectMeta {
        object_dispatch!(self, inner => &inner.meta)
    }

    /// Mutably borrow the wrapped object's metadata.
    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        object_dispatch!(self, inner => &mut inner.meta)
    }

    /// Identity key of the wrapped object.
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey {
            kind: self.kind(),
            namespace: self.meta().namespace.clone(),
            name: self.meta().name.clone(),
        }
    }

    /// Serialize to the store's wire form for field-index extraction.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
