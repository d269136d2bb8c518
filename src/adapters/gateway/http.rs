//! HTTP gateway adapter.
//!
//! Speaks JSON to the gateway process over two endpoints:
//! `POST /v1/plane-lifecycle` and `GET /v1/plane-status`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::errors::GatewayError;
use crate::domain::models::PlaneType;
use crate::domain::ports::gateway::{
    LifecycleAck, LifecycleNotification, PlaneConnectionStatus, PlaneGateway,
};

/// Default request timeout against the gateway.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the HTTP gateway client.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the gateway, e.g. `http://gateway:8445`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Config with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Gateway client over reqwest.
pub struct HttpPlaneGateway {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl HttpPlaneGateway {
    /// Build a client from config.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Rejected(format!("client construction failed: {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }
}

fn classify(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() || err.is_connect() {
        GatewayError::Unavailable(err.to_string())
    } else {
        GatewayError::Rejected(err.to_string())
    }
}

async fn read_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_server_error() {
        return Err(GatewayError::Unavailable(format!(
            "gateway returned {status}"
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::Rejected(format!(
            "gateway returned {status}: {body}"
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| GatewayError::Rejected(format!("malformed gateway response: {e}")))
}

#[async_trait]
impl PlaneGateway for HttpPlaneGateway {
    async fn notify_plane_lifecycle(
        &self,
        notification: LifecycleNotification,
    ) -> Result<LifecycleAck, GatewayError> {
        let response = self
            .client
            .post(self.url("/v1/plane-lifecycle"))
            .json(&notification)
            .send()
            .await
            .map_err(classify)?;
        read_response(response).await
    }

    async fn get_plane_status(
        &self,
        plane_type: PlaneType,
        plane_id: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<PlaneConnectionStatus, GatewayError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("planeType", plane_type.as_str()),
            ("planeId", plane_id),
            ("name", name),
        ];
        if let Some(namespace) = namespace {
            query.push(("namespace", namespace));
        }
        let response = self
            .client
            .get(self.url("/v1/plane-status"))
            .query(&query)
            .send()
            .await
            .map_err(classify)?;
        read_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::gateway::PlaneLifecycleEvent;

    fn notification() -> LifecycleNotification {
        LifecycleNotification {
            plane_type: PlaneType::Data,
            plane_id: "prod".into(),
            event: PlaneLifecycleEvent::Updated,
            namespace: Some("infra".into()),
            name: "dp1".into(),
        }
    }

    #[tokio::test]
    async fn test_notify_parses_ack() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/plane-lifecycle")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"plane_type":"data","event":"updated","name":"dp1"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"disconnected_agents":3}"#)
            .create_async()
            .await;

        let gateway = HttpPlaneGateway::new(GatewayConfig::new(server.url())).unwrap();
        let ack = gateway.notify_plane_lifecycle(notification()).await.unwrap();
        assert_eq!(ack.disconnected_agents, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/plane-lifecycle")
            .with_status(503)
            .create_async()
            .await;

        let gateway = HttpPlaneGateway::new(GatewayConfig::new(server.url())).unwrap();
        let err = gateway
            .notify_plane_lifecycle(notification())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_client_errors_are_permanent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/plane-lifecycle")
            .with_status(400)
            .with_body("bad plane type")
            .create_async()
            .await;

        let gateway = HttpPlaneGateway::new(GatewayConfig::new(server.url())).unwrap();
        let err = gateway
            .notify_plane_lifecycle(notification())
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_status_query_roundtrip() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/plane-status")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("planeType".into(), "dataplane".into()),
                mockito::Matcher::UrlEncoded("planeId".into(), "prod".into()),
                mockito::Matcher::UrlEncoded("name".into(), "dp1".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"connected":true,"connected_agents":2}"#)
            .create_async()
            .await;

        let gateway = HttpPlaneGateway::new(GatewayConfig::new(server.url())).unwrap();
        let status = gateway
            .get_plane_status(PlaneType::Data, "prod", Some("infra"), "dp1")
            .await
            .unwrap();
        assert!(status.connected);
        assert_eq!(status.connected_agents, 2);
        mock.assert_async().await;
    }
}
