use iotstream_domain::DomainError;
use thiserror::Error;

/// Why a single message was dropped
///
/// Never escalated past the worker loop; each variant is logged and the
/// worker moves on to the next message.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to decode message payload: {0}")]
    Decode(String),

    #[error("Reading rejected: {0}")]
    Validation(String),

    #[error("Failed to persist reading: {source}")]
    Persistence {
        raw_telemetry_id: Option<i64>,
        #[source]
        source: DomainError,
    },
}
