use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::error::QueueError;
use crate::message::{encode_json, publish_subject, BrokerMessage};
use crate::traits::{BrokerConnector, JetStreamPublisher, PullConsumer};

pub const DEFAULT_INGEST_TOPIC: &str = "iot_stream_v1";
pub const DEFAULT_EVENTS_TOPIC: &str = "telemetry-events";
pub const DEFAULT_BATCH_SIZE: usize = 30;

#[derive(Debug, Clone)]
pub struct QueueClientConfig {
    pub ingest_topic: String,
    pub events_topic: String,
    pub batch_size: usize,
}

impl Default for QueueClientConfig {
    fn default() -> Self {
        Self {
            ingest_topic: DEFAULT_INGEST_TOPIC.to_string(),
            events_topic: DEFAULT_EVENTS_TOPIC.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Serialize)]
struct ReadingEvent<'a> {
    device_id: &'a str,
    reading_value: f64,
}

/// Broker facade used by the ingestion worker
///
/// Consumer and producer are opened lazily. Each slot is guarded by an async
/// mutex held across the check-then-create, so concurrent first callers share
/// a single handle. A failed open leaves the slot empty and the next call
/// retries.
pub struct QueueClient {
    connector: Arc<dyn BrokerConnector>,
    config: QueueClientConfig,
    consumer: Mutex<Option<Arc<dyn PullConsumer>>>,
    producer: Mutex<Option<Arc<dyn JetStreamPublisher>>>,
}

impl QueueClient {
    pub fn new(connector: Arc<dyn BrokerConnector>, config: QueueClientConfig) -> Self {
        Self {
            connector,
            config,
            consumer: Mutex::new(None),
            producer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &QueueClientConfig {
        &self.config
    }

    pub async fn connect_consumer(&self, topic: &str) -> Result<Arc<dyn PullConsumer>, QueueError> {
        let mut slot = self.consumer.lock().await;
        if let Some(consumer) = slot.as_ref() {
            return Ok(Arc::clone(consumer));
        }

        match self.connector.connect_consumer(topic).await {
            Ok(consumer) => {
                info!(topic = %topic, "Consumer connected");
                *slot = Some(Arc::clone(&consumer));
                Ok(consumer)
            }
            Err(e) => {
                error!(topic = %topic, error = %e, "Failed to connect consumer");
                Err(QueueError::Connection(e))
            }
        }
    }

    pub async fn connect_producer(&self) -> Result<Arc<dyn JetStreamPublisher>, QueueError> {
        let mut slot = self.producer.lock().await;
        if let Some(producer) = slot.as_ref() {
            return Ok(Arc::clone(producer));
        }

        match self.connector.connect_producer().await {
            Ok(producer) => {
                info!("Producer connected");
                *slot = Some(Arc::clone(&producer));
                Ok(producer)
            }
            Err(e) => {
                error!(error = %e, "Failed to connect producer");
                Err(QueueError::Connection(e))
            }
        }
    }

    /// Up to `batch_size` messages from the ingest topic, waiting at most `timeout`
    pub async fn fetch_batch(&self, timeout: Duration) -> Result<Vec<BrokerMessage>, QueueError> {
        let consumer = self.connect_consumer(&self.config.ingest_topic).await?;

        let messages = consumer
            .fetch_messages(self.config.batch_size, timeout)
            .await
            .map_err(QueueError::Fetch)?;

        if !messages.is_empty() {
            debug!(message_count = messages.len(), "Fetched message batch");
        }
        Ok(messages)
    }

    /// Serialize `value` as JSON and publish it keyed by `key`
    ///
    /// Returns `false` when the producer is unavailable or the publish fails.
    #[instrument(skip(self, value), fields(topic = %topic, key = %key))]
    pub async fn publish<T>(&self, topic: &str, key: &str, value: &T) -> bool
    where
        T: Serialize + ?Sized + Sync,
    {
        match self.try_publish(topic, key, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Publish failed");
                false
            }
        }
    }

    async fn try_publish<T>(&self, topic: &str, key: &str, value: &T) -> Result<(), QueueError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let payload = encode_json(value)?;
        let producer = self.connect_producer().await?;
        let subject = publish_subject(topic, Some(key));

        producer
            .publish(subject.clone(), Some(key.to_string()), payload)
            .await
            .map_err(|source| QueueError::Publish { subject, source })
    }

    /// Publish `{device_id, reading_value}` on the events topic, keyed by device
    pub async fn publish_reading_event(&self, device_id: &str, reading_value: f64) -> bool {
        let event = ReadingEvent {
            device_id,
            reading_value,
        };
        self.publish(&self.config.events_topic, device_id, &event)
            .await
    }

    /// Release consumer and producer
    ///
    /// Never fails. Calling it again, or on a client that never opened a
    /// handle, does nothing.
    pub async fn close(&self) {
        let consumer = self.consumer.lock().await.take();
        let producer = self.producer.lock().await.take();

        if consumer.is_none() && producer.is_none() {
            debug!("Queue client not open, nothing to close");
            return;
        }

        if let Err(e) = self.connector.close().await {
            warn!(error = %e, "Error while closing broker connection");
        }
        info!("Queue client closed");
    }
}
