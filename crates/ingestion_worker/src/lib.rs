mod error;
mod service;
mod worker;

pub use error::IngestError;
pub use service::{IngestionOptions, IngestionService};
pub use worker::{IngestionWorker, IngestionWorkerConfig, WorkerState};
