//! Direct HTTP transport on `reqwest`

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::{Endpoint, Transport, TransportFailure, CONNECT_TIMEOUT, REQUEST_TIMEOUT};
use crate::error::{Error, Result};

/// Issues requests from this process
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("node-sync-check/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn read_body(response: reqwest::Response) -> Result<String, TransportFailure> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Node endpoint returned status: {}", status);
            return Err(TransportFailure::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, endpoint: &Endpoint, body: &str) -> Result<String, TransportFailure> {
        debug!("POST {} {}", endpoint.url, body);

        let response = self
            .client
            .post(&endpoint.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await?;

        Self::read_body(response).await
    }

    async fn get(&self, endpoint: &Endpoint, path: &str) -> Result<String, TransportFailure> {
        let url = endpoint.join(path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;

        Self::read_body(response).await
    }
}
