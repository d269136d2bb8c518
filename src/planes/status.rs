//! Agent-connection status polling and merge.
//!
//! The plane reconcilers poll the gateway for agent connectivity on a
//! configurable cadence and merge the answer into plane-CR status,
//! stamping `last_connected_time`/`last_disconnected_time` on
//! transitions.

use chrono::{DateTime, Utc};

use crate::domain::models::PlaneStatus;
use crate::domain::ports::gateway::PlaneConnectionStatus;

/// Default agent-status poll cadence, in seconds.
pub const DEFAULT_STATUS_UPDATE_INTERVAL_SECS: u64 = 30;

/// Merge a polled connection status into plane status. Returns whether
/// anything observable changed.
pub fn merge_connection_status(
    status: &mut PlaneStatus,
    polled: &PlaneConnectionStatus,
    now: DateTime<Utc>,
) -> bool {
    let mut changed = false;

    if status.connected != polled.connected {
        if polled.connected {
            status.last_connected_time = Some(now);
        } else {
            status.last_disconnected_time = Some(now);
        }
        status.connected = polled.connected;
        changed = true;
    }
    if status.connected_agents != polled.connected_agents {
        status.connected_agents = polled.connected_agents;
        changed = true;
    }
    if status.last_seen != polled.last_seen {
        status.last_seen = polled.last_seen;
        changed = true;
    }
    changed
}
