//! Plane reconciler, generic over the three plane variants.
//!
//! Responsibilities: finalizer lifecycle (gateway `deleted` before cache
//! eviction before finalizer removal), client-cache invalidation on spec
//! drift and plane-id changes, best-effort `updated` notifications, and
//! periodic agent-connection status merges.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::domain::errors::{ReconcileError, ReconcileResult, StoreError};
use crate::domain::meta::{ConditionStatus, Kind, ObjectKey, ObjectMeta, Resource};
use crate::domain::models::{
    AgentConnection, BuildPlane, DataPlane, Object, ObservabilityPlane, PlaneStatus, PlaneType,
};
use crate::config::ObservabilityPolicy;
use crate::domain::ports::store::ResourceStore;
use crate::planes::{
    merge_connection_status, PlaneClientCache, PlaneCoordinates, PlaneLifecycle,
};
use crate::runtime::{
    condition, ensure_finalizer, remove_finalizer, set_condition, ReconcileOutcome, Reconciler,
    CONDITION_READY,
};

/// Finalizer owned by the plane reconcilers.
pub const PLANE_FINALIZER: &str = "formation.dev/plane-lifecycle";

/// Capability surface the generic reconciler needs from a plane variant.
pub trait PlaneResource:
    Resource + TryFrom<Object, Error = StoreError> + Into<Object>
{
    /// Which plane family this variant is.
    const PLANE_TYPE: PlaneType;

    /// Whether this variant is expected to name an observability plane.
    const WANTS_OBSERVABILITY: bool;

    /// Logical plane id; empty for observability planes.
    fn plane_id(&self) -> &str;

    /// The observability plane this cluster reports into, if named.
    fn observability_plane_ref(&self) -> Option<&str>;

    /// Connection descriptor for client construction.
    fn connection(&self) -> &AgentConnection;

    /// Shared plane status.
    fn plane_status(&self) -> &PlaneStatus;

    /// Mutable shared plane status.
    fn plane_status_mut(&mut self) -> &mut PlaneStatus;
}

impl PlaneResource for DataPlane {
    const PLANE_TYPE: PlaneType = PlaneType::Data;
    const WANTS_OBSERVABILITY: bool = true;

    fn plane_id(&self) -> &str {
        &self.spec.plane_id
    }

    fn observability_plane_ref(&self) -> Option<&str> {
        self.spec.observability_plane_ref.as_deref()
    }

    fn connection(&self) -> &AgentConnection {
        &self.spec.connection
    }

    fn plane_status(&self) -> &PlaneStatus {
        &self.status
    }

    fn plane_status_mut(&mut self) -> &mut PlaneStatus {
        &mut self.status
    }
}

impl PlaneResource for BuildPlane {
    const PLANE_TYPE: PlaneType = PlaneType::Build;
    const WANTS_OBSERVABILITY: bool = true;

    fn plane_id(&self) -> &str {
        &self.spec.plane_id
    }

    fn observability_plane_ref(&self) -> Option<&str> {
        self.spec.observability_plane_ref.as_deref()
    }

    fn connection(&self) -> &AgentConnection {
        &self.spec.connection
    }

    fn plane_status(&self) -> &PlaneStatus {
        &self.status
    }

    fn plane_status_mut(&mut self) -> &mut PlaneStatus {
        &mut self.status
    }
}

impl PlaneResource for ObservabilityPlane {
    const PLANE_TYPE: PlaneType = PlaneType::Observability;
    const WANTS_OBSERVABILITY: bool = false;

    fn plane_id(&self) -> &str {
        ""
    }

    fn observability_plane_ref(&self) -> Option<&str> {
        None
    }

    fn connection(&self) -> &AgentConnection {
        &self.spec.connection
    }

    fn plane_status(&self) -> &PlaneStatus {
        &self.status
    }

    fn plane_status_mut(&mut self) -> &mut PlaneStatus {
        &mut self.status
    }
}

/// Generic reconciler for one plane variant.
pub struct PlaneReconciler<P: PlaneResource> {
    store: Arc<dyn ResourceStore>,
    clients: Arc<PlaneClientCache>,
    lifecycle: Arc<PlaneLifecycle>,
    status_interval: Duration,
    observability_policy: ObservabilityPolicy,
    _marker: std::marker::PhantomData<fn() -> P>,
}

impl<P: PlaneResource> PlaneReconciler<P> {
    /// New reconciler with the given status-poll cadence.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        clients: Arc<PlaneClientCache>,
        lifecycle: Arc<PlaneLifecycle>,
        status_interval: Duration,
        observability_policy: ObservabilityPolicy,
    ) -> Self {
        Self {
            store,
            clients,
            lifecycle,
            status_interval,
            observability_policy,
            _marker: std::marker::PhantomData,
        }
    }

    fn coordinates<'a>(meta: &'a ObjectMeta, plane_id: &'a str) -> PlaneCoordinates<'a> {
        PlaneCoordinates {
            plane_type: P::PLANE_TYPE,
            plane_id,
            namespace: meta.namespace.as_deref(),
            name: &meta.name,
        }
    }

    async fn finalize(&self, plane: P) -> ReconcileResult<ReconcileOutcome> {
        let meta = plane.meta().clone();
        let plane_id = plane.plane_id().to_string();

        // Order matters: the gateway learns about the deletion first, the
        // cached client goes second, the finalizer falls last. A gateway
        // failure keeps the finalizer so the CR stays visibly
        // terminating.
        let ack = self
            .lifecycle
            .notify_deleted(
                P::PLANE_TYPE,
                &plane_id,
                meta.namespace.as_deref(),
                &meta.name,
            )
            .await
            .map_err(|err| ReconcileError::Transient(format!("deletion notify: {err}")))?;
        info!(
            plane = %meta.name,
            disconnected = ack.disconnected_agents,
            "gateway confirmed plane deletion"
        );

        self.clients.evict(&Self::coordinates(&meta, &plane_id));

        remove_finalizer(&self.store, &plane.into(), PLANE_FINALIZER).await?;
        Ok(ReconcileOutcome::Done)
    }

    async fn observe(&self, plane: P) -> ReconcileResult<ReconcileOutcome> {
        let object = ensure_finalizer(&self.store, &plane.clone().into(), PLANE_FINALIZER).await?;
        let mut plane: P = object.try_into()?;

        if P::WANTS_OBSERVABILITY
            && self.observability_policy == ObservabilityPolicy::Fail
            && plane.observability_plane_ref().is_none()
        {
            return Err(ReconcileError::ReferenceMissing {
                path: "spec.observabilityPlaneRef".to_string(),
                key: ObjectKey {
                    kind: Kind::ObservabilityPlane,
                    namespace: plane.meta().namespace.clone(),
                    name: "default".to_string(),
                },
            });
        }

        let generation = plane.meta().generation;
        let spec_drifted = generation > plane.plane_status().observed_generation;
        let plane_id = plane.plane_id().to_string();
        let meta = plane.meta().clone();
        let coords = Self::coordinates(&meta, &plane_id);

        // Invalidate before any remote call sees a stale client.
        if spec_drifted {
            self.clients.evict(&coords);
        }
        let id_changed = plane
            .plane_status()
            .observed_plane_id
            .as_deref()
            .is_some_and(|observed| observed != plane_id);
        if id_changed {
            self.clients.evict_on_plane_id_change(&coords);
        }

        // Create and spec change collapse into one `updated` event.
        if spec_drifted {
            self.lifecycle
                .notify_updated(
                    P::PLANE_TYPE,
                    &plane_id,
                    meta.namespace.as_deref(),
                    &meta.name,
                )
                .await;
        }

        // Poll agent connectivity and fold it into status.
        let polled = self
            .lifecycle
            .gateway()
            .get_plane_status(
                P::PLANE_TYPE,
                &plane_id,
                meta.namespace.as_deref(),
                &meta.name,
            )
            .await
            .map_err(ReconcileError::from)?;

        let mut changed = merge_connection_status(plane.plane_status_mut(), &polled, Utc::now());
        if plane.plane_status().observed_plane_id.as_deref() != Some(plane_id.as_str()) {
            plane.plane_status_mut().observed_plane_id = Some(plane_id.clone());
            changed = true;
        }
        if plane.observed_generation() != generation {
            plane.set_observed_generation(generation);
            changed = true;
        }
        let ready = condition(
            CONDITION_READY,
            if polled.connected {
                ConditionStatus::True
            } else {
                ConditionStatus::False
            },
            if polled.connected {
                "AgentConnected"
            } else {
                "AgentDisconnected"
            },
            format!("{} agent(s) connected", polled.connected_agents),
            generation,
        );
        changed |= set_condition(plane.conditions_mut(), ready);

        if changed {
            match self.store.update_status(plane.into()).await {
                Ok(_) => {}
                // Conflicts requeue without surfacing an error.
                Err(err) if err.is_conflict() => {
                    debug!(plane = %meta.name, "status conflict, requeueing");
                    return Ok(ReconcileOutcome::Requeue);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(ReconcileOutcome::RequeueAfter(self.status_interval))
    }
}

#[async_trait]
impl<P: PlaneResource> Reconciler for PlaneReconciler<P> {
    fn kind(&self) -> Kind {
        P::KIND
    }

    async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<ReconcileOutcome> {
        let Some(object) = self.store.get(key).await? else {
            return Ok(ReconcileOutcome::Done);
        };
        let plane: P = object
            .try_into()
            .map_err(|err: StoreError| ReconcileError::Fatal(err.to_string()))?;

        if plane.meta().is_terminating() {
            self.finalize(plane).await
        } else {
            self.observe(plane).await
        }
    }
}
