//! Domain layer: models, ports, and the error taxonomy.
//!
//! Everything here is infrastructure-free; adapters and the runtime build
//! on these types.

pub mod errors;
pub mod meta;
pub mod models;
pub mod ports;
pub mod raw;

pub use errors::{
    ApplyError, GatewayError, ReconcileError, ReconcileResult, StoreError, StoreResult,
};
pub use meta::{Condition, ConditionStatus, Kind, ObjectKey, ObjectMeta, Resource, ResourceRef};
pub use raw::RawDoc;
