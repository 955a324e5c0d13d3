use std::future::Future;
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use crate::{HealthReport, NetworkError, ReplicaPayload, Result};

/// Node-to-node calls. `HttpPeerClient` speaks the HTTP wire contract; tests
/// substitute in-memory implementations.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// `GET /health`
    async fn health(&self, endpoint: &str) -> Result<HealthReport>;

    /// `GET /object/{id}`, `None` on 404.
    async fn fetch(&self, endpoint: &str, object_id: &str) -> Result<Option<Bytes>>;

    /// `POST /object/{id}`
    async fn replicate(&self, endpoint: &str, payload: &ReplicaPayload) -> Result<()>;

    /// `DELETE /object/{id}`, false on 404.
    async fn delete(&self, endpoint: &str, object_id: &str) -> Result<bool>;
}

/// Bounds `fut` by `timeout`. An elapsed timer is reported as
/// `NetworkError::Timeout` so callers treat it like any other failed call.
pub async fn with_timeout<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(NetworkError::Timeout(format!("{} after {:?}", what, timeout))),
    }
}

pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| NetworkError::ConnectionFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn object_url(endpoint: &str, object_id: &str) -> String {
        format!("{}/object/{}", endpoint.trim_end_matches('/'), object_id)
    }

    fn map_error(url: &str, err: reqwest::Error) -> NetworkError {
        if err.is_timeout() {
            NetworkError::Timeout(url.to_string())
        } else {
            NetworkError::ConnectionFailed(format!("{}: {}", url, err))
        }
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn health(&self, endpoint: &str) -> Result<HealthReport> {
        let url = format!("{}/health", endpoint.trim_end_matches('/'));
        let response = self.client.get(&url).send().await
            .map_err(|e| Self::map_error(&url, e))?;

        if !response.status().is_success() {
            return Err(NetworkError::UnexpectedStatus { status: response.status().as_u16(), url });
        }

        let body = response.bytes().await.map_err(|e| Self::map_error(&url, e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch(&self, endpoint: &str, object_id: &str) -> Result<Option<Bytes>> {
        let url = Self::object_url(endpoint, object_id);
        let response = self.client.get(&url).send().await
            .map_err(|e| Self::map_error(&url, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response.bytes().await.map_err(|e| Self::map_error(&url, e))?;
                Ok(Some(body))
            }
            status => Err(NetworkError::UnexpectedStatus { status: status.as_u16(), url }),
        }
    }

    async fn replicate(&self, endpoint: &str, payload: &ReplicaPayload) -> Result<()> {
        let url = Self::object_url(endpoint, &payload.record.id);
        let body = payload.encode()?;

        let response = self.client
            .post(&url)
            .header("content-type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| Self::map_error(&url, e))?;

        if !response.status().is_success() {
            return Err(NetworkError::UnexpectedStatus { status: response.status().as_u16(), url });
        }

        Ok(())
    }

    async fn delete(&self, endpoint: &str, object_id: &str) -> Result<bool> {
        let url = Self::object_url(endpoint, object_id);
        let response = self.client.delete(&url).send().await
            .map_err(|e| Self::map_error(&url, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(NetworkError::UnexpectedStatus { status: status.as_u16(), url }),
        }
    }
}
