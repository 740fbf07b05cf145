use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::headers::outgoing_headers;
use crate::message::{topic_subjects, BrokerMessage};
use crate::traits::{BrokerConnector, JetStreamPublisher, PullConsumer};

#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        info!("Successfully connected to NATS");
        Ok(Self { client, jetstream })
    }

    /// Create the stream backing `topic` unless it already exists
    pub async fn ensure_stream(&self, topic: &str) -> Result<()> {
        match self.jetstream.get_stream(topic).await {
            Ok(_) => {
                debug!(stream = %topic, "Stream already exists");
            }
            Err(_) => {
                self.jetstream
                    .create_stream(StreamConfig {
                        name: topic.to_string(),
                        subjects: vec![topic_subjects(topic)],
                        description: Some(format!("iotstream topic {}", topic)),
                        ..Default::default()
                    })
                    .await
                    .with_context(|| format!("Failed to create stream '{}'", topic))?;
                info!(stream = %topic, "Created stream");
            }
        }

        Ok(())
    }

    /// Durable pull consumer over every subject of `topic`
    ///
    /// Messages are never acknowledged: delivery is at-most-once.
    pub async fn create_pull_consumer(
        &self,
        topic: &str,
        consumer_name: &str,
    ) -> Result<NatsPullConsumer> {
        let consumer = self
            .jetstream
            .create_consumer_on_stream(
                jetstream::consumer::pull::Config {
                    name: Some(consumer_name.to_string()),
                    durable_name: Some(consumer_name.to_string()),
                    filter_subject: topic_subjects(topic),
                    ack_policy: jetstream::consumer::AckPolicy::None,
                    ..Default::default()
                },
                topic,
            )
            .await
            .with_context(|| format!("Failed to create consumer '{}'", consumer_name))?;

        info!(stream = %topic, consumer = %consumer_name, "Consumer created");
        Ok(NatsPullConsumer { consumer })
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Flush pending publishes; the connection closes once every clone is dropped
    pub async fn close(&self) -> Result<()> {
        info!("Closing NATS connection");
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")
    }
}

/// JetStream pull consumer
pub struct NatsPullConsumer {
    consumer: jetstream::consumer::PullConsumer,
}

#[async_trait]
impl PullConsumer for NatsPullConsumer {
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: Duration,
    ) -> Result<Vec<BrokerMessage>> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .context("Failed to fetch messages")?;

        let mut result = Vec::new();
        while let Some(message) = messages.next().await {
            match message {
                Ok(message) => result.push(BrokerMessage::from(message)),
                Err(e) => warn!(error = %e, "Error receiving message from batch"),
            }
        }
        Ok(result)
    }
}

pub struct NatsJetStreamPublisher {
    context: jetstream::Context,
}

impl NatsJetStreamPublisher {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl JetStreamPublisher for NatsJetStreamPublisher {
    #[instrument(skip(self, key, payload), fields(subject = %subject, payload_size = payload.len()))]
    async fn publish(&self, subject: String, key: Option<String>, payload: Bytes) -> Result<()> {
        let headers = outgoing_headers(key.as_deref());

        let ack = self
            .context
            .publish_with_headers(subject, headers, payload)
            .await
            .context("Failed to publish message to JetStream")?;

        ack.await
            .context("Failed to receive JetStream acknowledgment")?;
        Ok(())
    }
}

/// Connection settings for [`NatsConnector`]
#[derive(Debug, Clone)]
pub struct NatsConnectorConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub consumer_name: String,
    /// Streams ensured before the producer is handed out
    pub publish_topics: Vec<String>,
}

/// Opens one NATS connection on first use and shares it between consumer and producer
///
/// `close` releases the connector's handle; the connection is torn down once
/// the consumers and publishers handed out have been dropped as well. The next
/// `connect_*` call opens a fresh connection.
pub struct NatsConnector {
    config: NatsConnectorConfig,
    client: Mutex<Option<NatsClient>>,
}

impl NatsConnector {
    pub fn new(config: NatsConnectorConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<NatsClient> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = NatsClient::connect(&self.config.url, self.config.connect_timeout).await?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl BrokerConnector for NatsConnector {
    async fn connect_consumer(&self, topic: &str) -> Result<Arc<dyn PullConsumer>> {
        let client = self.client().await?;
        client.ensure_stream(topic).await?;
        let consumer = client
            .create_pull_consumer(topic, &self.config.consumer_name)
            .await?;
        Ok(Arc::new(consumer))
    }

    async fn connect_producer(&self) -> Result<Arc<dyn JetStreamPublisher>> {
        let client = self.client().await?;
        for topic in &self.config.publish_topics {
            client.ensure_stream(topic).await?;
        }
        Ok(Arc::new(NatsJetStreamPublisher::new(
            client.jetstream().clone(),
        )))
    }

    async fn close(&self) -> Result<()> {
        let client = self.client.lock().await.take();
        match client {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }
}
