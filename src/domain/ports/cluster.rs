//! Remote plane client port.
//!
//! A plane client speaks the downstream cluster's resource API. Only
//! apply-with-field-owner and get are required of it; everything else the
//! remote cluster does is its own business.

use async_trait::async_trait;

use crate::domain::errors::ApplyError;
use crate::domain::models::AgentConnection;
use crate::domain::raw::RawDoc;

/// Coordinates of a resource inside the remote cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteCoordinates {
    /// Remote API kind, e.g. `Deployment`.
    pub kind: String,
    /// Remote namespace, if namespaced.
    pub namespace: Option<String>,
    /// Remote object name.
    pub name: String,
}

/// Client for one remote plane.
#[async_trait]
pub trait PlaneClient: Send + Sync {
    /// Server-side apply of a rendered resource, owned by `field_owner`.
    async fn apply(&self, resource: &RawDoc, field_owner: &str) -> Result<(), ApplyError>;

    /// Fetch a remote resource, `None` if absent.
    async fn get(&self, coords: &RemoteCoordinates) -> Result<Option<RawDoc>, ApplyError>;

    /// Delete a remote resource; absent objects are not an error.
    async fn delete(&self, coords: &RemoteCoordinates) -> Result<(), ApplyError>;
}

/// Builds clients from a plane CR's connection descriptor. The plane cache
/// sits in front of this; construction is assumed expensive.
#[async_trait]
pub trait PlaneClientBuilder: Send + Sync {
    /// Construct an authenticated client for the given connection.
    async fn build(
        &self,
        connection: &AgentConnection,
    ) -> Result<std::sync::Arc<dyn PlaneClient>, ApplyError>;
}
