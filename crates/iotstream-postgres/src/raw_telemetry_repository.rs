use async_trait::async_trait;
use iotstream_domain::{
    DomainError, DomainResult, MarkProcessedInput, ProcessedReading, RawTelemetry,
    RawTelemetryRepository, StageRawTelemetryInput,
};
use tracing::{debug, info};

use crate::client::PostgresClient;
use crate::models::{ProcessedReadingRow, RawTelemetryRow, RAW_TELEMETRY_COLUMNS};

/// Staging area for messages as received
#[derive(Clone)]
pub struct PostgresRawTelemetryRepository {
    client: PostgresClient,
}

impl PostgresRawTelemetryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RawTelemetryRepository for PostgresRawTelemetryRepository {
    async fn stage(&self, input: StageRawTelemetryInput) -> DomainResult<RawTelemetry> {
        debug!(device_id = %input.device_id, source = %input.source, "Staging raw telemetry");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "INSERT INTO raw_telemetry (device_id, raw_data, timestamp, source, processed)
             VALUES ($1, $2, $3, $4, FALSE)
             RETURNING {}",
            RAW_TELEMETRY_COLUMNS
        );

        let row = conn
            .query_one(
                &query,
                &[
                    &input.device_id,
                    &input.raw_data,
                    &input.timestamp,
                    &input.source,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(RawTelemetryRow::from(&row).into())
    }

    async fn mark_processed(&self, input: MarkProcessedInput) -> DomainResult<ProcessedReading> {
        debug!(
            raw_telemetry_id = input.raw_telemetry_id,
            device_id = %input.device_id,
            "Marking raw telemetry processed"
        );

        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let processed: Option<bool> = tx
            .query_opt(
                "SELECT processed FROM raw_telemetry WHERE id = $1 FOR UPDATE",
                &[&input.raw_telemetry_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .map(|row| row.get(0));

        match processed {
            None => return Err(DomainError::RawTelemetryNotFound(input.raw_telemetry_id)),
            Some(true) => {
                return Err(DomainError::RawTelemetryAlreadyProcessed(
                    input.raw_telemetry_id,
                ))
            }
            Some(false) => {}
        }

        let row = tx
            .query_one(
                "INSERT INTO processed_readings (device_id, reading_value, timestamp, raw_telemetry_id)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id",
                &[
                    &input.device_id,
                    &input.reading_value,
                    &input.timestamp,
                    &input.raw_telemetry_id,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        tx.execute(
            "UPDATE raw_telemetry SET processed = TRUE WHERE id = $1",
            &[&input.raw_telemetry_id],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let processed_row = ProcessedReadingRow {
            id: row.get(0),
            device_id: input.device_id,
            reading_value: input.reading_value,
            timestamp: input.timestamp,
            raw_telemetry_id: Some(input.raw_telemetry_id),
        };

        info!(
            raw_telemetry_id = input.raw_telemetry_id,
            processed_reading_id = processed_row.id,
            "Raw telemetry processed"
        );

        Ok(processed_row.into())
    }

    async fn get_raw_telemetry(&self, id: i64) -> DomainResult<Option<RawTelemetry>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM raw_telemetry WHERE id = $1",
            RAW_TELEMETRY_COLUMNS
        );

        let row = conn
            .query_opt(&query, &[&id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| RawTelemetryRow::from(&row).into()))
    }
}
