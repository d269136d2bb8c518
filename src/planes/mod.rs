//! Plane lifecycle and client cache: how the control plane reaches and
//! tracks remote clusters.

mod cache;
mod lifecycle;
mod status;

pub use cache::{PlaneClientCache, PlaneCoordinates, DEFAULT_CACHE_KEY_VERSION};
pub use lifecycle::PlaneLifecycle;
pub use status::{merge_connection_status, DEFAULT_STATUS_UPDATE_INTERVAL_SECS};
