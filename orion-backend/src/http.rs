//! Shared HTTP plumbing for the REST adapters.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::BackendError;

/// Thin wrapper over a reqwest client with a fixed per-request timeout and
/// a base URL. Both adapters build on this; neither caches responses.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::from_reqwest)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn build_url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url, path)
    }

    /// GET a JSON payload.
    pub async fn get_json(&self, path: &str) -> Result<Value, BackendError> {
        let url = self.build_url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;
        Self::check_status(path, response)
            .await?
            .json::<Value>()
            .await
            .map_err(BackendError::from_reqwest)
    }

    /// GET raw bytes (thumbnail/static endpoints).
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        let url = self.build_url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;
        let response = Self::check_status(path, response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(BackendError::from_reqwest)?;
        Ok(bytes.to_vec())
    }

    /// POST with a JSON body, discarding any response body.
    pub async fn post_json(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<(), BackendError> {
        let url = self.build_url(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;
        Self::check_status(path, response).await.map(|_| ())
    }

    /// POST with no body, discarding any response body.
    pub async fn post_empty(&self, path: &str) -> Result<(), BackendError> {
        let url = self.build_url(path);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(BackendError::from_reqwest)?;
        Self::check_status(path, response).await.map(|_| ())
    }

    async fn check_status(
        path: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BackendError> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
                Ok(response)
            }
            status => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                log::warn!(
                    "[HttpTransport] {} failed with {}: {}",
                    path,
                    status,
                    body
                );
                Err(BackendError::Http {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_normalizes_slashes() {
        let transport = HttpTransport::new(
            "http://printer:8080/",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            transport.build_url("/status"),
            "http://printer:8080/status"
        );
        assert_eq!(
            transport.build_url("files/local"),
            "http://printer:8080/files/local"
        );
    }
}
