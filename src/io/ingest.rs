//! Ingestion boundary client
//!
//! The receiving side deduplicates on (customer_id, region_id, enter_time),
//! so redelivery after a partial failure is safe.

use crate::domain::event::MovementEvent;
use crate::infra::error::Error;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Delivery target for movement events. HTTP in production; the dispatch
/// tests and single-node deployments substitute other implementations.
#[async_trait]
pub trait IngestionClient: Send + Sync {
    /// Deliver a batch in one request
    async fn post_batch(&self, events: &[MovementEvent]) -> Result<(), Error>;

    /// Deliver a single event
    async fn post_one(&self, event: &MovementEvent) -> Result<(), Error>;
}

pub struct HttpIngestionClient {
    client: reqwest::Client,
    events_url: String,
}

impl HttpIngestionClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        // Client is built once for connection pooling
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        info!(endpoint = %endpoint, "ingestion_client_initialized");
        Ok(Self { client, events_url: endpoint.to_string() })
    }

    async fn post_json<T: serde::Serialize + ?Sized>(&self, body: &T) -> Result<(), Error> {
        let response = self.client.post(&self.events_url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Delivery(format!("ingestion endpoint returned {}", status.as_u16())))
        }
    }
}

#[async_trait]
impl IngestionClient for HttpIngestionClient {
    async fn post_batch(&self, events: &[MovementEvent]) -> Result<(), Error> {
        self.post_json(events).await
    }

    async fn post_one(&self, event: &MovementEvent) -> Result<(), Error> {
        self.post_json(event).await
    }
}
