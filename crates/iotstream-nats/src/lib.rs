mod client;
mod error;
mod headers;
mod message;
mod queue_client;
mod traits;

pub use client::{
    NatsClient, NatsConnector, NatsConnectorConfig, NatsJetStreamPublisher, NatsPullConsumer,
};
pub use error::QueueError;
pub use headers::{extract_trace_context, set_parent_from_headers, KEY_HEADER};
pub use message::{encode_json, publish_subject, topic_subjects, BrokerMessage};
pub use queue_client::{
    QueueClient, QueueClientConfig, DEFAULT_BATCH_SIZE, DEFAULT_EVENTS_TOPIC, DEFAULT_INGEST_TOPIC,
};
pub use traits::{BrokerConnector, JetStreamPublisher, PullConsumer};

#[cfg(any(test, feature = "testing"))]
pub use traits::{MockBrokerConnector, MockJetStreamPublisher, MockPullConsumer};
