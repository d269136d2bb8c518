//! Versioned plane-client cache.
//!
//! Clients are cached under composite keys carrying a version prefix
//! (`v2/dataplane/<planeID>/<namespace>/<name>`); bumping the prefix in
//! configuration invalidates every entry at once. Lookup is optimistic,
//! eviction is explicit, and a plane CR whose `plane_id` drifted evicts
//! both its new key and a fallback keyed by its own name.

use std::sync::Arc;

use moka::sync::Cache;
use tracing::debug;

use crate::domain::errors::ApplyError;
use crate::domain::models::{AgentConnection, PlaneType};
use crate::domain::ports::cluster::{PlaneClient, PlaneClientBuilder};

/// Default cache-key version prefix.
pub const DEFAULT_CACHE_KEY_VERSION: &str = "v2";

/// Default maximum number of cached clients.
const CLIENT_CACHE_CAPACITY: u64 = 256;

/// Placeholder segment for cluster-scoped plane CRs.
const CLUSTER_SCOPE_SEGMENT: &str = "-";

/// Coordinates of one plane CR for key construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneCoordinates<'a> {
    /// Plane family.
    pub plane_type: PlaneType,
    /// Logical plane id; ignored for observability planes.
    pub plane_id: &'a str,
    /// CR namespace, if namespaced.
    pub namespace: Option<&'a str>,
    /// CR name.
    pub name: &'a str,
}

/// Cache of long-lived authenticated plane clients.
pub struct PlaneClientCache {
    version: String,
    builder: Arc<dyn PlaneClientBuilder>,
    clients: Cache<String, Arc<dyn PlaneClient>>,
}

impl PlaneClientCache {
    /// New cache with the given key-version prefix.
    pub fn new(version: impl Into<String>, builder: Arc<dyn PlaneClientBuilder>) -> Self {
        Self {
            version: version.into(),
            builder,
            clients: Cache::new(CLIENT_CACHE_CAPACITY),
        }
    }

    /// Composite cache key for a plane CR. Observability planes carry no
    /// plane id in their key.
    pub fn key(&self, coords: &PlaneCoordinates<'_>) -> String {
        let namespace = coords.namespace.unwrap_or(CLUSTER_SCOPE_SEGMENT);
        match coords.plane_type {
            PlaneType::Data | PlaneType::Build => format!(
                "{}/{}/{}/{}/{}",
                self.version,
                coords.plane_type,
                coords.plane_id,
                namespace,
                coords.name
            ),
            PlaneType::Observability => format!(
                "{}/{}/{}/{}",
                self.version, coords.plane_type, namespace, coords.name
            ),
        }
    }

    /// Fetch the cached client for a plane, constructing and caching one
    /// on miss.
    pub async fn client(
        &self,
        coords: &PlaneCoordinates<'_>,
        connection: &AgentConnection,
    ) -> Result<Arc<dyn PlaneClient>, ApplyError> {
        let key = self.key(coords);
        if let Some(client) = self.clients.get(&key) {
            return Ok(client);
        }
        // Construction happens outside any cache lock; a racing build for
        // the same key wastes one client, nothing more.
        let client = self.builder.build(connection).await?;
        self.clients.insert(key.clone(), client.clone());
        debug!(key = %key, "constructed plane client");
        Ok(client)
    }

    /// Evict the entry for a plane CR, if present.
    pub fn evict(&self, coords: &PlaneCoordinates<'_>) {
        let key = self.key(coords);
        self.clients.invalidate(&key);
        debug!(key = %key, "evicted plane client");
    }

    /// Evict for a plane whose `plane_id` changed since last observed:
    /// both the key under the new id and a fallback keyed by the CR's own
    /// name are dropped.
    pub fn evict_on_plane_id_change(&self, coords: &PlaneCoordinates<'_>) {
        self.evict(coords);
        let fallback = PlaneCoordinates {
            plane_id: coords.name,
            ..coords.clone()
        };
        self.evict(&fallback);
    }

    /// Whether a key currently holds a client (test observability).
    pub fn contains(&self, coords: &PlaneCoordinates<'_>) -> bool {
        self.clients.contains_key(&self.key(coords))
    }

    /// Number of cached clients (test observability).
    pub fn len(&self) -> u64 {
        self.clients.run_pending_tasks();
        self.clients.entry_count()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::domain::ports::cluster::RemoteCoordinates;
    use crate::domain::raw::RawDoc;

    struct CountingBuilder {
        builds: AtomicUsize,
    }

    struct NullClient;

    #[async_trait]
    impl PlaneClient for NullClient {
        async fn apply(&self, _resource: &RawDoc, _field_owner: &str) -> Result<(), ApplyError> {
            Ok(())
        }

        async fn get(
            &self,
            _coords: &RemoteCoordinates,
        ) -> Result<Option<RawDoc>, ApplyError> {
            Ok(None)
        }

        async fn delete(&self, _coords: &RemoteCoordinates) -> Result<(), ApplyError> {
            Ok(())
        }
    }

    #[async_trait]
    impl PlaneClientBuilder for CountingBuilder {
        async fn build(
            &self,
            _connection: &AgentConnection,
        ) -> Result<Arc<dyn PlaneClient>, ApplyError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullClient))
        }
    }

    fn cache() -> (PlaneClientCache, Arc<CountingBuilder>) {
        let builder = Arc::new(CountingBuilder {
            builds: AtomicUsize::new(0),
        });
        (
            PlaneClientCache::new(DEFAULT_CACHE_KEY_VERSION, builder.clone()),
            builder,
        )
    }

    fn coords<'a>() -> PlaneCoordinates<'a> {
        PlaneCoordinates {
            plane_type: PlaneType::Data,
            plane_id: "prod",
            namespace: Some("ns"),
            name: "dp1",
        }
    }

    #[test]
    fn test_key_shapes() {
        let (cache, _) = cache();
        assert_eq!(cache.key(&coords()), "v2/dataplane/prod/ns/dp1");

        let build = PlaneCoordinates {
            plane_type: PlaneType::Build,
            ..coords()
        };
        assert_eq!(cache.key(&build), "v2/buildplane/prod/ns/dp1");

        let obs = PlaneCoordinates {
            plane_type: PlaneType::Observability,
            plane_id: "",
            namespace: Some("ns"),
            name: "obs1",
        };
        // No plane id segment for observability planes.
        assert_eq!(cache.key(&obs), "v2/observabilityplane/ns/obs1");
    }

    #[tokio::test]
    async fn test_hit_skips_construction() {
        let (cache, builder) = cache();
        let connection = AgentConnection::default();
        cache.client(&coords(), &connection).await.unwrap();
        cache.client(&coords(), &connection).await.unwrap();
        assert_eq!(builder.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evict_forces_reconstruction() {
        let (cache, builder) = cache();
        let connection = AgentConnection::default();
        cache.client(&coords(), &connection).await.unwrap();
        cache.evict(&coords());
        assert!(!cache.contains(&coords()));
        cache.client(&coords(), &connection).await.unwrap();
        assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_plane_id_change_evicts_fallback_too() {
        let (cache, _) = cache();
        let connection = AgentConnection::default();

        // Client cached under the old id via the CR-name fallback shape.
        let old = PlaneCoordinates {
            plane_id: "dp1",
            ..coords()
        };
        cache.client(&old, &connection).await.unwrap();
        cache.client(&coords(), &connection).await.unwrap();

        cache.evict_on_plane_id_change(&coords());
        assert!(!cache.contains(&coords()));
        assert!(!cache.contains(&old));
    }

    #[test]
    fn test_version_bump_changes_every_key() {
        let builder = Arc::new(CountingBuilder {
            builds: AtomicUsize::new(0),
        });
        let v2 = PlaneClientCache::new("v2", builder.clone());
        let v3 = PlaneClientCache::new("v3", builder);
        assert_ne!(v2.key(&coords()), v3.key(&coords()));
    }
}
