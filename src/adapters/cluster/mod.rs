//! Remote plane client adapters.

mod remote;

pub use remote::{
    HttpPlaneClient, HttpPlaneClientBuilder, RecordedApply, RecordingClientBuilder,
    RecordingPlaneClient,
};
