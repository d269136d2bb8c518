//! Plane gateway port.
//!
//! The gateway terminates agent sessions from remote clusters. The control
//! plane notifies it of plane-CR lifecycle transitions and polls it for
//! agent connectivity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::GatewayError;
use crate::domain::models::PlaneType;

/// Lifecycle transition reported to the gateway. Creation and spec changes
/// collapse into one `Updated` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaneLifecycleEvent {
    /// Plane CR created or its spec changed.
    Updated,
    /// Plane CR is being finalized.
    Deleted,
}

/// Payload of a lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleNotification {
    /// Plane family.
    pub plane_type: PlaneType,
    /// Logical plane id; empty for observability planes.
    pub plane_id: String,
    /// The transition.
    pub event: PlaneLifecycleEvent,
    /// CR namespace, if namespaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// CR name.
    pub name: String,
}

/// Gateway response to a lifecycle notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleAck {
    /// How many agent sessions were dropped as a consequence.
    #[serde(default)]
    pub disconnected_agents: u32,
}

/// Agent connectivity for one plane as the gateway sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaneConnectionStatus {
    /// Whether at least one agent session is live.
    #[serde(default)]
    pub connected: bool,
    /// Number of live agent sessions.
    #[serde(default)]
    pub connected_agents: u32,
    /// Last heartbeat from any agent for this plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// RPC surface of the gateway process.
#[async_trait]
pub trait PlaneGateway: Send + Sync {
    /// Notify the gateway of a plane lifecycle transition.
    async fn notify_plane_lifecycle(
        &self,
        notification: LifecycleNotification,
    ) -> Result<LifecycleAck, GatewayError>;

    /// Fetch current agent connectivity for a plane.
    async fn get_plane_status(
        &self,
        plane_type: PlaneType,
        plane_id: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<PlaneConnectionStatus, GatewayError>;
}
