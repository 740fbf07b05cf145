use async_trait::async_trait;
use chrono::Utc;
use iotstream_domain::{
    CreateReadingRepoInput, DomainError, DomainResult, GetLatestReadingRepoInput,
    GetReadingRepoInput, GetRecentReadingsRepoInput, ListReadingsRepoInput, SensorReading,
    SensorReadingRepository, UpdateReadingRepoInput,
};
use tracing::{debug, info};

use crate::client::PostgresClient;
use crate::models::{SensorReadingRow, SENSOR_READING_COLUMNS};

#[derive(Clone)]
pub struct PostgresSensorReadingRepository {
    client: PostgresClient,
}

impl PostgresSensorReadingRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SensorReadingRepository for PostgresSensorReadingRepository {
    async fn create_reading(&self, input: CreateReadingRepoInput) -> DomainResult<SensorReading> {
        debug!(device_id = %input.device_id, "Creating sensor reading in database");

        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let now = Utc::now();
        let query = format!(
            "INSERT INTO sensor_readings
                 (device_id, reading_value, reading_type, unit, battery_level, raw_data, timestamp, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
             RETURNING {}",
            SENSOR_READING_COLUMNS
        );

        // a dropped transaction rolls back, so any error below leaves no partial row
        let row = tx
            .query_one(
                &query,
                &[
                    &input.device_id,
                    &input.reading_value,
                    &input.reading_type,
                    &input.unit,
                    &input.battery_level,
                    &input.raw_data,
                    &input.timestamp,
                    &now,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let reading: SensorReading = SensorReadingRow::from(&row).into();
        info!(
            reading_id = reading.id,
            device_id = %reading.device_id,
            "Sensor reading stored"
        );
        Ok(reading)
    }

    async fn list_readings(&self, input: ListReadingsRepoInput) -> DomainResult<Vec<SensorReading>> {
        debug!(skip = input.skip, limit = input.limit, "Listing sensor readings");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {}
             FROM sensor_readings
             ORDER BY timestamp DESC, id DESC
             OFFSET $1 LIMIT $2",
            SENSOR_READING_COLUMNS
        );

        let rows = conn
            .query(&query, &[&input.skip, &input.limit])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| SensorReadingRow::from(row).into())
            .collect())
    }

    async fn get_reading(&self, input: GetReadingRepoInput) -> DomainResult<Option<SensorReading>> {
        debug!(reading_id = input.id, "Getting sensor reading from database");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {} FROM sensor_readings WHERE id = $1",
            SENSOR_READING_COLUMNS
        );

        let row = conn
            .query_opt(&query, &[&input.id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| SensorReadingRow::from(&row).into()))
    }

    async fn get_latest_reading(
        &self,
        input: GetLatestReadingRepoInput,
    ) -> DomainResult<Option<SensorReading>> {
        debug!(
            device_id = %input.device_id,
            unit = ?input.unit,
            "Getting latest sensor reading"
        );

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {}
             FROM sensor_readings
             WHERE device_id = $1 AND ($2::TEXT IS NULL OR unit = $2)
             ORDER BY timestamp DESC, id DESC
             LIMIT 1",
            SENSOR_READING_COLUMNS
        );

        let row = conn
            .query_opt(&query, &[&input.device_id, &input.unit])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| SensorReadingRow::from(&row).into()))
    }

    async fn get_recent_readings(
        &self,
        input: GetRecentReadingsRepoInput,
    ) -> DomainResult<Vec<SensorReading>> {
        debug!(
            device_id = %input.device_id,
            window_size = input.window_size,
            "Getting recent sensor readings"
        );

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {}
             FROM sensor_readings
             WHERE device_id = $1
             ORDER BY timestamp DESC, id DESC
             LIMIT $2",
            SENSOR_READING_COLUMNS
        );

        let rows = conn
            .query(&query, &[&input.device_id, &input.window_size])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| SensorReadingRow::from(row).into())
            .collect())
    }

    async fn update_reading(
        &self,
        input: UpdateReadingRepoInput,
    ) -> DomainResult<Option<SensorReading>> {
        debug!(reading_id = input.id, "Updating sensor reading in database");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();
        let query = format!(
            "UPDATE sensor_readings
             SET reading_value = COALESCE($2, reading_value),
                 reading_type = COALESCE($3, reading_type),
                 unit = COALESCE($4, unit),
                 battery_level = COALESCE($5, battery_level),
                 updated_at = $6
             WHERE id = $1
             RETURNING {}",
            SENSOR_READING_COLUMNS
        );

        let row = conn
            .query_opt(
                &query,
                &[
                    &input.id,
                    &input.reading_value,
                    &input.reading_type,
                    &input.unit,
                    &input.battery_level,
                    &now,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if row.is_some() {
            info!(reading_id = input.id, "Sensor reading updated");
        }

        Ok(row.map(|row| SensorReadingRow::from(&row).into()))
    }

    async fn list_devices(&self) -> DomainResult<Vec<String>> {
        debug!("Listing devices with readings");

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT DISTINCT device_id FROM sensor_readings ORDER BY device_id",
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}
