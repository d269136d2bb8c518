//! Plane custom resources: remote clusters the control plane drives.
//!
//! A plane CR describes how to reach one remote cluster through its agent.
//! Several plane CRs may share a `plane_id` to fan out onto one physical
//! cluster. Planes are created and mutated only by administrators; the
//! control plane writes status alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::meta::{Condition, ObjectMeta};

/// Which family of plane a CR (or gateway notification) addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaneType {
    /// Runs rendered workloads.
    Data,
    /// Runs build workflows.
    Build,
    /// Hosts logs/metrics tooling.
    Observability,
}

impl PlaneType {
    /// Stable name used in cache keys and gateway payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "dataplane",
            Self::Build => "buildplane",
            Self::Observability => "observabilityplane",
        }
    }
}

impl std::fmt::Display for PlaneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection descriptor for the agent serving a plane.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConnection {
    /// Base URL of the cluster resource API as exposed through the agent.
    #[serde(default)]
    pub endpoint: String,
    /// Name of the secret holding the bearer token, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<String>,
    /// PEM bundle for server verification; empty means system roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
}

/// Status shared by all plane variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaneStatus {
    /// Spec generation most recently reconciled.
    #[serde(default)]
    pub observed_generation: i64,
    /// Standard condition list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    /// The `plane_id` observed at the last reconcile; used to evict stale
    /// client-cache entries when the id changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_plane_id: Option<String>,
    /// Whether at least one agent session is connected.
    #[serde(default)]
    pub connected: bool,
    /// Number of connected agent sessions.
    #[serde(default)]
    pub connected_agents: u32,
    /// Last heartbeat the gateway saw from any agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Stamped when `connected` transitions false -> true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected_time: Option<DateTime<Utc>>,
    /// Stamped when `connected` transitions true -> false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_disconnected_time: Option<DateTime<Utc>>,
}

/// Spec of a data plane CR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPlaneSpec {
    /// Logical cluster identity; shared across CRs that target the same
    /// physical cluster.
    pub plane_id: String,
    /// Agent connection descriptor.
    #[serde(default)]
    pub connection: AgentConnection,
    /// Optional pointer at the observability plane serving this cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability_plane_ref: Option<String>,
}

/// A remote cluster that runs rendered workloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPlane {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: DataPlaneSpec,
    /// Observed state.
    #[serde(default)]
    pub status: PlaneStatus,
}

impl DataPlane {
    /// New data plane with empty status.
    pub fn new(meta: ObjectMeta, spec: DataPlaneSpec) -> Self {
        Self {
            meta,
            spec,
            status: PlaneStatus::default(),
        }
    }
}

/// Spec of a build plane CR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPlaneSpec {
    /// Logical cluster identity.
    pub plane_id: String,
    /// Agent connection descriptor.
    #[serde(default)]
    pub connection: AgentConnection,
    /// Optional pointer at the observability plane serving this cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability_plane_ref: Option<String>,
}

/// A remote cluster that runs build workflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPlane {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: BuildPlaneSpec,
    /// Observed state.
    #[serde(default)]
    pub status: PlaneStatus,
}

impl BuildPlane {
    /// New build plane with empty status.
    pub fn new(meta: ObjectMeta, spec: BuildPlaneSpec) -> Self {
        Self {
            meta,
            spec,
            status: PlaneStatus::default(),
        }
    }
}

/// Spec of an observability plane CR. Observability planes are addressed by
/// name alone; they carry no logical `plane_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityPlaneSpec {
    /// Agent connection descriptor.
    #[serde(default)]
    pub connection: AgentConnection,
}

/// A remote cluster hosting observability tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityPlane {
    /// Object metadata.
    pub meta: ObjectMeta,
    /// Desired state.
    pub spec: ObservabilityPlaneSpec,
    /// Observed state.
    #[serde(default)]
    pub status: PlaneStatus,
}

impl ObservabilityPlane {
    /// New observability plane with empty status.
    pub fn new(meta: ObjectMeta, spec: ObservabilityPlaneSpec) -> Self {
        Self {
            meta,
            spec,
            status: PlaneStatus::default(),
        }
    }
}
