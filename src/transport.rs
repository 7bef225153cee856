//! Shipping envelopes to the collector.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::models::Envelope;

/// Delivers one envelope. `Ok` means the collector accepted it; any error
/// means the chunk counts as not delivered.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, envelope: &Envelope) -> Result<()>;
}

/// POSTs the envelope as JSON to the collector URL. Single attempt, no retry.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build().context("Failed to build HTTP client")?,
            url: url.into(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.collector_url.clone(), config.timeout())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(envelope)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            bail!("collector returned {}: {}", status, body.trim());
        }

        Ok(())
    }
}
