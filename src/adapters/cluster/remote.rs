//! Remote plane client adapter.
//!
//! Speaks a minimal resource API through the agent tunnel: server-side
//! apply with a field owner, get, and delete. A recording fake for
//! reconciler tests lives alongside.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::ApplyError;
use crate::domain::models::AgentConnection;
use crate::domain::ports::cluster::{PlaneClient, PlaneClientBuilder, RemoteCoordinates};
use crate::domain::raw::RawDoc;

/// Default request timeout against a remote plane.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP implementation of [`PlaneClient`].
pub struct HttpPlaneClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPlaneClient {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.endpoint.trim_end_matches('/'))
    }

    fn coords_path(coords: &RemoteCoordinates) -> String {
        match &coords.namespace {
            Some(namespace) => {
                format!("/resources/{}/{}/{}", coords.kind, namespace, coords.name)
            }
            None => format!("/resources/{}/{}", coords.kind, coords.name),
        }
    }
}

fn classify(err: reqwest::Error) -> ApplyError {
    if err.is_timeout() || err.is_connect() {
        ApplyError::Transient(err.to_string())
    } else {
        ApplyError::Rejected(err.to_string())
    }
}

fn classify_status(status: reqwest::StatusCode, body: String) -> ApplyError {
    if status.is_server_error() || status == reqwest::StatusCode::CONFLICT {
        ApplyError::Transient(format!("remote returned {status}: {body}"))
    } else {
        ApplyError::Rejected(format!("remote returned {status}: {body}"))
    }
}

#[async_trait]
impl PlaneClient for HttpPlaneClient {
    async fn apply(&self, resource: &RawDoc, field_owner: &str) -> Result<(), ApplyError> {
        let response = self
            .client
            .post(self.url("/apply"))
            .query(&[("fieldOwner", field_owner)])
            .json(resource)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }
        Ok(())
    }

    async fn get(&self, coords: &RemoteCoordinates) -> Result<Option<RawDoc>, ApplyError> {
        let response = self
            .client
            .get(self.url(&Self::coords_path(coords)))
            .send()
            .await
            .map_err(classify)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }
        response
            .json::<RawDoc>()
            .await
            .map(Some)
            .map_err(|e| ApplyError::Rejected(format!("malformed remote resource: {e}")))
    }

    async fn delete(&self, coords: &RemoteCoordinates) -> Result<(), ApplyError> {
        let response = self
            .client
            .delete(self.url(&Self::coords_path(coords)))
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }
}

/// Builds [`HttpPlaneClient`]s from agent connection descriptors.
pub struct HttpPlaneClientBuilder;

#[async_trait]
impl PlaneClientBuilder for HttpPlaneClientBuilder {
    async fn build(
        &self,
        connection: &AgentConnection,
    ) -> Result<Arc<dyn PlaneClient>, ApplyError> {
        let mut builder = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT);
        if let Some(token) = &connection.token_secret {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApplyError::Rejected(format!("invalid token: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }
        let client = builder
            .build()
            .map_err(|e| ApplyError::Rejected(format!("client construction failed: {e}")))?;
        Ok(Arc::new(HttpPlaneClient {
            endpoint: connection.endpoint.clone(),
            client,
        }))
    }
}

/// One apply observed by the recording client.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedApply {
    /// The rendered resource body.
    pub resource: RawDoc,
    /// Field owner the apply carried.
    pub field_owner: String,
}

/// Recording fake for reconciler tests.
#[derive(Default)]
pub struct RecordingPlaneClient {
    applies: Mutex<Vec<RecordedApply>>,
    deletes: Mutex<Vec<RemoteCoordinates>>,
}

impl RecordingPlaneClient {
    /// Applies observed so far.
    pub fn applies(&self) -> Vec<RecordedApply> {
        self.applies.lock().expect("applies poisoned").clone()
    }

    /// Deletes observed so far.
    pub fn deletes(&self) -> Vec<RemoteCoordinates> {
        self.deletes.lock().expect("deletes poisoned").clone()
    }
}

#[async_trait]
impl PlaneClient for RecordingPlaneClient {
    async fn apply(&self, resource: &RawDoc, field_owner: &str) -> Result<(), ApplyError> {
        self.applies
            .lock()
            .expect("applies poisoned")
            .push(RecordedApply {
                resource: resource.clone(),
                field_owner: field_owner.to_string(),
            });
        Ok(())
    }

    async fn get(&self, _coords: &RemoteCoordinates) -> Result<Option<RawDoc>, ApplyError> {
        Ok(None)
    }

    async fn delete(&self, coords: &RemoteCoordinates) -> Result<(), ApplyError> {
        self.deletes
            .lock()
            .expect("deletes poisoned")
            .push(coords.clone());
        Ok(())
    }
}

/// Builder that always hands out the same shared recording client.
pub struct RecordingClientBuilder {
    client: Arc<RecordingPlaneClient>,
}

impl Default for RecordingClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingClientBuilder {
    /// New builder with a fresh recording client.
    pub fn new() -> Self {
        Self {
            client: Arc::new(RecordingPlaneClient::default()),
        }
    }

    /// The shared recording client, for assertions.
    pub fn client(&self) -> Arc<RecordingPlaneClient> {
        self.client.clone()
    }
}

#[async_trait]
impl PlaneClientBuilder for RecordingClientBuilder {
    async fn build(
        &self,
        _connection: &AgentConnection,
    ) -> Result<Arc<dyn PlaneClient>, ApplyError> {
        Ok(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_sends_field_owner() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/apply")
            .match_query(mockito::Matcher::UrlEncoded(
                "fieldOwner".into(),
                "formation".into(),
            ))
            .with_status(200)
            .create_async()
            .await;

        let builder = HttpPlaneClientBuilder;
        let client = builder
            .build(&AgentConnection {
                endpoint: server.url(),
                token_secret: None,
                ca_bundle: None,
            })
            .await
            .unwrap();

        let resource: RawDoc = serde_yaml::from_str("kind: Deployment\n").unwrap();
        client.apply(&resource, "formation").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_absent_resource_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/resources/Deployment/ns/web")
            .with_status(404)
            .create_async()
            .await;

        let builder = HttpPlaneClientBuilder;
        let client = builder
            .build(&AgentConnection {
                endpoint: server.url(),
                token_secret: None,
                ca_bundle: None,
            })
            .await
            .unwrap();

        let got = client
            .get(&RemoteCoordinates {
                kind: "Deployment".into(),
                namespace: Some("ns".into()),
                name: "web".into(),
            })
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_permanent_rejection_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/apply")
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .with_body("policy denies this resource")
            .create_async()
            .await;

        let builder = HttpPlaneClientBuilder;
        let client = builder
            .build(&AgentConnection {
                endpoint: server.url(),
                token_secret: None,
                ca_bundle: None,
            })
            .await
            .unwrap();

        let resource: RawDoc = serde_yaml::from_str("kind: Deployment\n").unwrap();
        let err = client.apply(&resource, "formation").await.unwrap_err();
        assert!(matches!(err, ApplyError::Rejected(_)));
    }
}
