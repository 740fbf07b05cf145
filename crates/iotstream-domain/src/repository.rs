use async_trait::async_trait;

use crate::error::DomainResult;
use crate::types::{
    CreateReadingRepoInput, CreateRollingAverageRepoInput, GetLatestReadingRepoInput,
    GetReadingRepoInput, GetRecentReadingsRepoInput, ListReadingsRepoInput, MarkProcessedInput,
    ProcessedReading, RawTelemetry, RollingAverage, SensorReading, StageRawTelemetryInput,
    UpdateReadingRepoInput,
};

/// Repository trait for sensor reading storage operations
/// Infrastructure layer (e.g., iotstream-postgres) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SensorReadingRepository: Send + Sync {
    /// Insert a reading inside a transaction and return the stored row
    async fn create_reading(&self, input: CreateReadingRepoInput) -> DomainResult<SensorReading>;

    /// Page through readings, newest first
    async fn list_readings(&self, input: ListReadingsRepoInput) -> DomainResult<Vec<SensorReading>>;

    /// Get a reading by ID
    async fn get_reading(&self, input: GetReadingRepoInput) -> DomainResult<Option<SensorReading>>;

    /// Most recent reading for a device, optionally restricted to one unit
    async fn get_latest_reading(
        &self,
        input: GetLatestReadingRepoInput,
    ) -> DomainResult<Option<SensorReading>>;

    /// At most `window_size` readings for a device, newest first
    async fn get_recent_readings(
        &self,
        input: GetRecentReadingsRepoInput,
    ) -> DomainResult<Vec<SensorReading>>;

    /// Apply a partial update; `None` when the reading does not exist
    async fn update_reading(
        &self,
        input: UpdateReadingRepoInput,
    ) -> DomainResult<Option<SensorReading>>;

    /// Distinct device identifiers that have at least one reading
    async fn list_devices(&self) -> DomainResult<Vec<String>>;
}

/// Repository trait for the raw telemetry staging area
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RawTelemetryRepository: Send + Sync {
    /// Store a message as received, with `processed = false`
    async fn stage(&self, input: StageRawTelemetryInput) -> DomainResult<RawTelemetry>;

    /// Insert the derived processed reading and flip the processed flag in one transaction
    async fn mark_processed(&self, input: MarkProcessedInput) -> DomainResult<ProcessedReading>;

    async fn get_raw_telemetry(&self, id: i64) -> DomainResult<Option<RawTelemetry>>;
}

/// Repository trait for rolling average rows
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RollingAverageRepository: Send + Sync {
    async fn create_rolling_average(
        &self,
        input: CreateRollingAverageRepoInput,
    ) -> DomainResult<RollingAverage>;

    async fn get_latest_rolling_average(
        &self,
        device_id: &str,
    ) -> DomainResult<Option<RollingAverage>>;
}
