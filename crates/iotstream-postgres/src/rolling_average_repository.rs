use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use iotstream_domain::{
    CreateRollingAverageRepoInput, DomainError, DomainResult, RollingAverage,
    RollingAverageRepository,
};
use tokio_postgres::Row;
use tracing::{debug, info};

use crate::client::PostgresClient;
use crate::identifier::IdentifierCodec;

const ROLLING_AVERAGE_COLUMNS: &str =
    "id, device_id, average_value, timestamp, window_size, reading_type, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresRollingAverageRepository {
    client: PostgresClient,
    codec: Arc<dyn IdentifierCodec>,
}

impl PostgresRollingAverageRepository {
    pub fn new(client: PostgresClient) -> Self {
        let codec = client.identifier_codec();
        Self { client, codec }
    }

    fn map_row(&self, row: &Row) -> DomainResult<RollingAverage> {
        let id = self.codec.decode(row, "id")?;
        let window_size: i32 = row.get("window_size");

        Ok(RollingAverage {
            id,
            device_id: row.get("device_id"),
            average_value: row.get("average_value"),
            timestamp: row.get("timestamp"),
            window_size: usize::try_from(window_size).map_err(|e| {
                DomainError::RepositoryError(anyhow::anyhow!(
                    "Negative window_size {} for rolling average {}: {}",
                    window_size,
                    id,
                    e
                ))
            })?,
            reading_type: row.get("reading_type"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl RollingAverageRepository for PostgresRollingAverageRepository {
    async fn create_rolling_average(
        &self,
        input: CreateRollingAverageRepoInput,
    ) -> DomainResult<RollingAverage> {
        debug!(
            device_id = %input.device_id,
            window_size = input.window_size,
            "Storing rolling average"
        );

        let window_size = i32::try_from(input.window_size).map_err(|_| {
            DomainError::InvalidArgument(format!(
                "window_size {} does not fit the storage column",
                input.window_size
            ))
        })?;

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();
        let encoded_id = self.codec.encode(input.id);
        let query = format!(
            "INSERT INTO rolling_averages
                 (id, device_id, average_value, timestamp, window_size, reading_type, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {}",
            ROLLING_AVERAGE_COLUMNS
        );

        let row = conn
            .query_one(
                &query,
                &[
                    &*encoded_id as &(dyn tokio_postgres::types::ToSql + Sync),
                    &input.device_id,
                    &input.average_value,
                    &input.timestamp,
                    &window_size,
                    &input.reading_type,
                    &now,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let average = self.map_row(&row)?;
        info!(
            rolling_average_id = %average.id,
            device_id = %average.device_id,
            average_value = average.average_value,
            "Rolling average stored"
        );
        Ok(average)
    }

    async fn get_latest_rolling_average(
        &self,
        device_id: &str,
    ) -> DomainResult<Option<RollingAverage>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let query = format!(
            "SELECT {}
             FROM rolling_averages
             WHERE device_id = $1
             ORDER BY timestamp DESC, created_at DESC
             LIMIT 1",
            ROLLING_AVERAGE_COLUMNS
        );

        let row = conn
            .query_opt(&query, &[&device_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.map(|row| self.map_row(&row)).transpose()
    }
}
