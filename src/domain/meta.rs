//! Object identity, metadata, and status primitives shared by every stored
//! resource.
//!
//! Every entity in the control-plane store carries an [`ObjectMeta`] with a
//! monotonic `generation` (advanced on spec changes), a `resource_version`
//! for optimistic concurrency, ordered finalizers, and a deletion timestamp
//! stamped when a delete is requested while finalizers remain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The set of resource kinds the control plane manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Kind {
    /// Remote cluster that runs workloads.
    DataPlane,
    /// Remote cluster that runs builds.
    BuildPlane,
    /// Remote cluster that hosts observability tooling.
    ObservabilityPlane,
    /// Grouping of components with a shared pipeline.
    Project,
    /// Deployment target resolved by bindings.
    Environment,
    /// A deployable unit owned by a project.
    Component,
    /// Platform-engineer template a component instantiates.
    ComponentType,
    /// Reusable schema + templates composable onto components.
    TraitDef,
    /// Container/endpoint/connection spec produced by a build.
    Workload,
    /// Per-(component, environment) override document.
    EnvSettings,
    /// Desired release of a component into one environment.
    ReleaseBinding,
    /// Immutable freeze of type + traits + workload + values.
    ComponentRelease,
    /// Immutable per-environment rendering input snapshot.
    ComponentEnvSnapshot,
    /// Workflow template (schema + run template).
    Workflow,
    /// One instantiation of a workflow.
    WorkflowRun,
}

impl Kind {
    /// Stable lowercase name used in keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataPlane => "dataplane",
            Self::BuildPlane => "buildplane",
            Self::ObservabilityPlane => "observabilityplane",
            Self::Project => "project",
            Self::Environment => "environment",
            Self::Component => "component",
            Self::ComponentType => "componenttype",
            Self::TraitDef => "trait",
            Self::Workload => "workload",
            Self::EnvSettings => "envsettings",
            Self::ReleaseBinding => "releasebinding",
            Self::ComponentRelease => "componentrelease",
            Self::ComponentEnvSnapshot => "componentenvsnapshot",
            Self::Workflow => "workflow",
            Self::WorkflowRun => "workflowrun",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a stored object: `{kind, namespace-or-cluster, name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Resource kind.
    pub kind: Kind,
    /// Namespace, or `None` for cluster-scoped objects.
    pub namespace: Option<String>,
    /// Object name, unique within the (kind, namespace) pair.
    pub name: String,
}

impl ObjectKey {
    /// Namespaced key.
    pub fn namespaced(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Cluster-scoped key.
    pub fn cluster_scoped(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A typed cross-entity pointer. The kind tag is always explicit; there is
/// no polymorphic reference anywhere in the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Kind of the referent.
    pub kind: Kind,
    /// Name of the referent.
    pub name: String,
    /// Namespace of the referent; `None` inherits the referrer's namespace
    /// or addresses a cluster-scoped object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    /// Reference to an object in the referrer's own namespace.
    pub fn local(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: None,
        }
    }

    /// Resolve to a concrete key, defaulting the namespace from the
    /// referring object.
    pub fn key_in(&self, default_namespace: Option<&str>) -> ObjectKey {
        ObjectKey {
            kind: self.kind,
            namespace: self
                .namespace
                .clone()
                .or_else(|| default_namespace.map(str::to_string)),
            name: self.name.clone(),
        }
    }
}

/// Common metadata carried by every stored object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object name.
    pub name: String,
    /// Namespace; `None` for cluster-scoped kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Store-assigned identity, stable for the life of the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    /// Monotonic counter advanced by the store on every spec change.
    #[serde(default)]
    pub generation: i64,
    /// Opaque version for optimistic concurrency; advanced on every write.
    #[serde(default)]
    pub resource_version: u64,
    /// Ordered finalizer markers blocking physical deletion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// Set by the store when deletion is requested while finalizers remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// When the object was first created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata for a namespaced object.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// Metadata for a cluster-scoped object.
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether deletion has been requested.
    pub fn is_terminating(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Whether the given finalizer is present.
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }
}

/// Observed truth value of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The controller cannot determine the condition.
    Unknown,
}

/// One entry in a status condition list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type, e.g. `Ready` or `Degraded`.
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Truth value.
    pub status: ConditionStatus,
    /// Machine-readable reason in PascalCase.
    pub reason: String,
    /// Human-readable detail.
    pub message: String,
    /// Spec generation this condition was computed from.
    pub observed_generation: i64,
    /// When `status` last changed.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Two conditions are equivalent when everything except the transition
    /// time matches. Status writes are skipped for equivalent conditions.
    pub fn equivalent(&self, other: &Condition) -> bool {
        self.condition_type == other.condition_type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}

/// Access to the metadata and the status subresource common to every kind.
///
/// Reconcilers and the runtime work against this trait; concrete kinds also
/// implement `TryFrom<Object>`/`Into<Object>` for explicit dispatch.
pub trait Resource: Clone + Send + Sync + 'static {
    /// The kind tag of this resource type.
    const KIND: Kind;

    /// Borrow metadata.
    fn meta(&self) -> &ObjectMeta;

    /// Mutably borrow metadata. Reconcilers may only touch finalizers here.
    fn meta_mut(&mut self) -> &mut ObjectMeta;

    /// The generation most recently acted on by the controller.
    fn observed_generation(&self) -> i64;

    /// Stamp the generation acted on.
    fn set_observed_generation(&mut self, generation: i64);

    /// Borrow the condition list.
    fn conditions(&self) -> &[Condition];

    /// Mutably borrow the condition list.
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;

    /// Identity key of this object.
    fn key(&self) -> ObjectKey {
        ObjectKey {
            kind: Self::KIND,
            namespace: self.meta().namespace.clone(),
            name: self.meta().name.clone(),
        }
    }
}
