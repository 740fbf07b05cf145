use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Raw telemetry not found: {0}")]
    RawTelemetryNotFound(i64),

    #[error("Raw telemetry already processed: {0}")]
    RawTelemetryAlreadyProcessed(i64),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
