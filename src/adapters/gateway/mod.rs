//! Gateway adapters: the HTTP client and an in-process fake.

mod fake;
mod http;

pub use fake::FakeGateway;
pub use http::{GatewayConfig, HttpPlaneGateway};
