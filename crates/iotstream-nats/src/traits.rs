use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::message::BrokerMessage;

/// Pull side of a topic
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PullConsumer: Send + Sync {
    /// Fetch up to `max_messages`, waiting at most `expires`
    ///
    /// Messages that fail to arrive intact are logged and left out of the
    /// result; only a failure of the fetch itself is an error.
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: Duration,
    ) -> Result<Vec<BrokerMessage>>;
}

/// Publish side of the broker
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamPublisher: Send + Sync {
    /// Publish a payload and wait for the broker acknowledgment
    async fn publish(&self, subject: String, key: Option<String>, payload: Bytes) -> Result<()>;
}

/// Creates broker handles on demand
///
/// `QueueClient` calls each method at most once per open slot; implementations
/// are free to share one underlying connection between the two.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect_consumer(&self, topic: &str) -> Result<Arc<dyn PullConsumer>>;

    async fn connect_producer(&self) -> Result<Arc<dyn JetStreamPublisher>>;

    /// Flush and release the underlying connection
    async fn close(&self) -> Result<()>;
}
