//! In-process gateway fake for tests and local development.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::errors::GatewayError;
use crate::domain::models::PlaneType;
use crate::domain::ports::gateway::{
    LifecycleAck, LifecycleNotification, PlaneConnectionStatus, PlaneGateway,
};

/// Scriptable gateway: records notifications, serves a configurable
/// connection status, and can fail a number of leading calls.
pub struct FakeGateway {
    notifications: Mutex<Vec<LifecycleNotification>>,
    status: Mutex<PlaneConnectionStatus>,
    fail_next: AtomicU32,
    reject_next: AtomicU32,
    disconnected_agents: u32,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    /// Healthy fake with no scripted failures.
    pub fn new() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            status: Mutex::new(PlaneConnectionStatus::default()),
            fail_next: AtomicU32::new(0),
            reject_next: AtomicU32::new(0),
            disconnected_agents: 0,
        }
    }

    /// Fail the next `count` lifecycle calls with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Reject the next `count` lifecycle calls with a permanent error
    /// (no point retrying).
    pub fn reject_next(&self, count: u32) {
        self.reject_next.store(count, Ordering::SeqCst);
    }

    /// Set the connection status served to pollers.
    pub fn set_status(&self, status: PlaneConnectionStatus) {
        *self.status.lock().expect("status poisoned") = status;
    }

    /// Notifications received so far.
    pub fn notifications(&self) -> Vec<LifecycleNotification> {
        self.notifications
            .lock()
            .expect("notifications poisoned")
            .clone()
    }
}

#[async_trait]
impl PlaneGateway for FakeGateway {
    async fn notify_plane_lifecycle(
        &self,
        notification: LifecycleNotification,
    ) -> Result<LifecycleAck, GatewayError> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(GatewayError::Unavailable("scripted failure".into()));
        }
        let rejections = self.reject_next.load(Ordering::SeqCst);
        if rejections > 0 {
            self.reject_next.store(rejections - 1, Ordering::SeqCst);
            return Err(GatewayError::Rejected("scripted rejection".into()));
        }
        self.notifications
            .lock()
            .expect("notifications poisoned")
            .push(notification);
        Ok(LifecycleAck {
            disconnected_agents: self.disconnected_agents,
        })
    }

    async fn get_plane_status(
        &self,
        _plane_type: PlaneType,
        _plane_id: &str,
        _namespace: Option<&str>,
        _name: &str,
    ) -> Result<PlaneConnectionStatus, GatewayError> {
        Ok(self.status.lock().expect("status poisoned").clone())
    }
}
