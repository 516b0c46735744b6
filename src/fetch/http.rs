// src/fetch/http.rs

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::Transport;
use crate::error::TransportError;

/// `reqwest`-backed transport with a fixed user-agent.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, address: &str, timeout: Duration) -> Result<String, TransportError> {
        debug!("Fetching text from {}", address);
        let resp = self
            .client
            .get(address)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }
}
