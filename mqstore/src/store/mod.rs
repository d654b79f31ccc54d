//! Append-only value store
//!
//! [`Store`] is the backend seam, [`sqlite::SqliteStore`] the shipped backend.
//! [`StoreWriter`] adds the bounded retry policy, [`StoreHandler`] connects the writer
//! to bus subscriptions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use bytes::Bytes;
use chrono::NaiveDateTime;

use crate::bus::MessageHandler;
use crate::error::MqstoreError;
use crate::query::{Row, StoreQuery};
use crate::topic::TopicPath;
use crate::Result;

pub mod sqlite;

#[async_trait]
pub trait Store: Sync + Send {
    /// Append one value, returning the store-assigned record id
    async fn append(
        &self,
        tenant_id: &str,
        source: &str,
        value: &str,
        observed_at: NaiveDateTime,
    ) -> std::result::Result<i64, MqstoreError>;

    async fn select(&self, query: &StoreQuery) -> std::result::Result<Vec<Row>, MqstoreError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_elapsed_time: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    #[inline]
    pub fn new(initial_interval: Duration, max_elapsed_time: Duration, multiplier: f64) -> Self {
        Self { initial_interval, max_elapsed_time, multiplier }
    }

    #[inline]
    pub fn from_settings(cfg: &mqstore_conf::Store) -> Self {
        Self::new(cfg.retry_initial_interval, cfg.retry_max_elapsed_time, cfg.retry_multiplier)
    }

    pub fn backoff_strategy(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_elapsed_time(Some(self.max_elapsed_time))
            .with_multiplier(self.multiplier)
            .build()
    }
}

/// Writes and reads through a [`Store`], retrying failures with exponential backoff
/// until the policy's elapsed-time budget is spent. The last error is returned to the caller.
#[derive(Clone)]
pub struct StoreWriter {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
}

impl StoreWriter {
    #[inline]
    pub fn new(store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn append(
        &self,
        tenant_id: &str,
        source: &str,
        value: &str,
        observed_at: NaiveDateTime,
    ) -> std::result::Result<i64, MqstoreError> {
        retry(self.retry.backoff_strategy(), || async {
            self.store.append(tenant_id, source, value, observed_at).await.map_err(|e| {
                log::debug!("append failure, tenant: {}, source: {}, {}", tenant_id, source, e);
                backoff::Error::transient(e)
            })
        })
        .await
        .map_err(|e| {
            log::error!("append failure, tenant: {}, source: {}, {}", tenant_id, source, e);
            e
        })
    }

    pub async fn select(&self, query: &StoreQuery) -> std::result::Result<Vec<Row>, MqstoreError> {
        retry(self.retry.backoff_strategy(), || async {
            self.store.select(query).await.map_err(backoff::Error::transient)
        })
        .await
        .map_err(|e| {
            log::error!("select failure, query: {:?}, {}", query, e);
            e
        })
    }
}

/// Persists every message delivered to a store-topic subscription
pub struct StoreHandler {
    writer: StoreWriter,
}

impl StoreHandler {
    #[inline]
    pub fn new(writer: StoreWriter) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl MessageHandler for StoreHandler {
    async fn handle(&self, topic: &str, payload: &Bytes) -> Result<()> {
        let path = TopicPath::parse(topic).map_err(MqstoreError::from)?;
        let value = String::from_utf8_lossy(payload);
        let record_id = self.writer.append(&path.tenant_id, &path.source, &value, mqstore_utils::now_local()).await?;
        log::debug!("stored record {}, topic: {}", record_id, topic);
        Ok(())
    }
}
