use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Broker connection failed: {0}")]
    Connection(#[source] anyhow::Error),

    #[error("Failed to fetch from broker: {0}")]
    Fetch(#[source] anyhow::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish to '{subject}': {source}")]
    Publish {
        subject: String,
        #[source]
        source: anyhow::Error,
    },
}
