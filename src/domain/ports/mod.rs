//! Domain ports (interfaces) for the control plane.

pub mod cluster;
pub mod gateway;
pub mod store;

pub use cluster::{PlaneClient, PlaneClientBuilder, RemoteCoordinates};
pub use gateway::{
    LifecycleAck, LifecycleNotification, PlaneConnectionStatus, PlaneGateway, PlaneLifecycleEvent,
};
pub use store::{
    FieldSelector, ListOptions, ResourceStore, WatchEvent, WatchEventType, WatchStream,
};
