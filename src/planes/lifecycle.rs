//! Gateway lifecycle notifications.
//!
//! The control plane tells the gateway about plane-CR transitions:
//! `updated` on create and spec change (collapsed into one event type),
//! `deleted` during finalization. Live-path notifications are best-effort;
//! deletion notifications are retried so agents are never left believing a
//! deleted plane is still authorized.

use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::domain::errors::GatewayError;
use crate::domain::models::PlaneType;
use crate::domain::ports::gateway::{
    LifecycleAck, LifecycleNotification, PlaneGateway, PlaneLifecycleEvent,
};

/// How long deletion notifications retry before giving up and leaving the
/// finalizer in place for the next reconcile.
const DELETE_NOTIFY_MAX_ELAPSED: Duration = Duration::from_secs(15);

/// Lifecycle notifier over a gateway.
pub struct PlaneLifecycle {
    gateway: Arc<dyn PlaneGateway>,
}

impl PlaneLifecycle {
    /// Notifier over the given gateway.
    pub fn new(gateway: Arc<dyn PlaneGateway>) -> Self {
        Self { gateway }
    }

    /// The gateway behind this notifier.
    pub fn gateway(&self) -> Arc<dyn PlaneGateway> {
        self.gateway.clone()
    }

    /// Best-effort `updated` notification. Failures are logged and
    /// swallowed: they must not block status updates on the live path.
    pub async fn notify_updated(
        &self,
        plane_type: PlaneType,
        plane_id: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<LifecycleAck> {
        let notification = notification(
            plane_type,
            plane_id,
            PlaneLifecycleEvent::Updated,
            namespace,
            name,
        );
        match self.gateway.notify_plane_lifecycle(notification).await {
            Ok(ack) => {
                debug!(
                    plane_type = %plane_type,
                    plane_id,
                    disconnected = ack.disconnected_agents,
                    "gateway acknowledged update"
                );
                Some(ack)
            }
            Err(err) => {
                warn!(plane_type = %plane_type, plane_id, error = %err, "update notification failed (best effort)");
                None
            }
        }
    }

    /// `deleted` notification during finalization. Transient gateway
    /// failures retry with backoff; a persistent failure is returned so
    /// the caller keeps the finalizer and requeues.
    pub async fn notify_deleted(
        &self,
        plane_type: PlaneType,
        plane_id: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<LifecycleAck, GatewayError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(DELETE_NOTIFY_MAX_ELAPSED),
            ..ExponentialBackoff::default()
        };
        let gateway = self.gateway.clone();
        let result = backoff::future::retry(policy, || {
            let gateway = gateway.clone();
            let notification = notification(
                plane_type,
                plane_id,
                PlaneLifecycleEvent::Deleted,
                namespace,
                name,
            );
            async move {
                gateway
                    .notify_plane_lifecycle(notification)
                    .await
                    .map_err(|err| {
                        if err.is_transient() {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
            }
        })
        .await?;

        debug!(
            plane_type = %plane_type,
            plane_id,
            disconnected = result.disconnected_agents,
            "gateway acknowledged deletion"
        );
        Ok(result)
    }
}

fn notification(
    plane_type: PlaneType,
    plane_id: &str,
    event: PlaneLifecycleEvent,
    namespace: Option<&str>,
    name: &str,
) -> LifecycleNotification {
    LifecycleNotification {
        plane_type,
        plane_id: plane_id.to_string(),
        event,
        namespace: namespace.map(str::to_string),
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::domain::ports::gateway::PlaneConnectionStatus;

    /// Scriptable gateway: fails the first `fail_first` calls.
    struct FlakyGateway {
        calls: AtomicU32,
        fail_first: u32,
        last_event: std::sync::Mutex<Option<LifecycleNotification>>,
    }

    impl FlakyGateway {
        fn new(fail_first: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                last_event: std::sync::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl PlaneGateway for FlakyGateway {
        async fn notify_plane_lifecycle(
            &self,
            notification: LifecycleNotification,
        ) -> Result<LifecycleAck, GatewayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_event.lock().unwrap() = Some(notification);
            if call < self.fail_first {
                return Err(GatewayError::Unavailable("gateway restarting".into()));
            }
            Ok(LifecycleAck {
                disconnected_agents: 2,
            })
        }

        async fn get_plane_status(
            &self,
            _plane_type: PlaneType,
            _plane_id: &str,
            _namespace: Option<&str>,
            _name: &str,
        ) -> Result<PlaneConnectionStatus, GatewayError> {
            Ok(PlaneConnectionStatus::default())
        }
    }

    #[tokio::test]
    async fn test_updated_is_best_effort() {
        let gateway = Arc::new(FlakyGateway::new(u32::MAX));
        let lifecycle = PlaneLifecycle::new(gateway.clone());
        let ack = lifecycle
            .notify_updated(PlaneType::Data, "prod", Some("ns"), "dp1")
            .await;
        assert!(ack.is_none());
        // Exactly one attempt; no retry storm on the live path.
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deleted_retries_transient_failures() {
        let gateway = Arc::new(FlakyGateway::new(2));
        let lifecycle = PlaneLifecycle::new(gateway.clone());
        let ack = lifecycle
            .notify_deleted(PlaneType::Build, "ci", None, "bp1")
            .await
            .unwrap();
        assert_eq!(ack.disconnected_agents, 2);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);

        let event = gateway.last_event.lock().unwrap().clone().unwrap();
        assert_eq!(event.event, PlaneLifecycleEvent::Deleted);
        assert_eq!(event.plane_id, "ci");
    }

    #[tokio::test]
    async fn test_deleted_permanent_rejection_not_retried() {
        struct RejectingGateway(AtomicU32);

        #[async_trait]
        impl PlaneGateway for RejectingGateway {
            async fn notify_plane_lifecycle(
                &self,
                _notification: LifecycleNotification,
            ) -> Result<LifecycleAck, GatewayError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Rejected("unknown plane type".into()))
            }

            async fn get_plane_status(
                &self,
                _plane_type: PlaneType,
                _plane_id: &str,
                _namespace: Option<&str>,
                _name: &str,
            ) -> Result<PlaneConnectionStatus, GatewayError> {
                Ok(PlaneConnectionStatus::default())
            }
        }

        let gateway = Arc::new(RejectingGateway(AtomicU32::new(0)));
        let lifecycle = PlaneLifecycle::new(gateway.clone());
        let err = lifecycle
            .notify_deleted(PlaneType::Data, "prod", Some("ns"), "dp1")
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(gateway.0.load(Ordering::SeqCst), 1);
    }
}
