use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{DomainError, DomainResult};
use crate::repository::SensorReadingRepository;
use crate::types::{
    CreateReadingInput, CreateReadingRepoInput, GetLatestReadingRepoInput, GetReadingRepoInput,
    GetRecentReadingsRepoInput, ListReadingsRepoInput, SensorReading, UpdateReadingInput,
    UpdateReadingRepoInput,
};
use crate::validate::{validate_with, ReadingLimits};

/// Domain service for sensor reading storage
/// Both the ingestion worker and API handlers go through this layer
pub struct SensorReadingService {
    repository: Arc<dyn SensorReadingRepository>,
    limits: ReadingLimits,
}

impl SensorReadingService {
    pub fn new(repository: Arc<dyn SensorReadingRepository>, limits: ReadingLimits) -> Self {
        Self { repository, limits }
    }

    pub fn limits(&self) -> &ReadingLimits {
        &self.limits
    }

    /// Validate and persist a reading.
    ///
    /// Fails with `ValidationError` before touching storage when the input
    /// violates the reading contract. The timestamp defaults to now; a client
    /// timestamp inside the clock-skew tolerance is clamped to now so that no
    /// stored reading is dated in the future.
    pub async fn create_reading(&self, input: CreateReadingInput) -> DomainResult<SensorReading> {
        validate_with(&input, &self.limits)?;

        let now = chrono::Utc::now();
        let timestamp = input.timestamp.map_or(now, |ts| ts.min(now));

        let repo_input = CreateReadingRepoInput {
            device_id: input.device_id.trim().to_string(),
            reading_value: input.reading_value,
            reading_type: input.reading_type,
            unit: input.unit,
            battery_level: input.battery_level,
            raw_data: input.raw_data.map(raw_data_to_text),
            timestamp,
        };

        debug!(
            device_id = %repo_input.device_id,
            reading_type = %repo_input.reading_type,
            "Creating sensor reading"
        );

        let reading = self.repository.create_reading(repo_input).await?;

        info!(
            reading_id = reading.id,
            device_id = %reading.device_id,
            "Sensor reading created"
        );
        Ok(reading)
    }

    /// Page through readings, newest first
    pub async fn get_readings(&self, skip: i64, limit: i64) -> DomainResult<Vec<SensorReading>> {
        if skip < 0 {
            return Err(DomainError::InvalidArgument(format!(
                "skip must be non-negative, got {}",
                skip
            )));
        }
        if limit < 0 {
            return Err(DomainError::InvalidArgument(format!(
                "limit must be non-negative, got {}",
                limit
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.repository
            .list_readings(ListReadingsRepoInput { skip, limit })
            .await
    }

    pub async fn get_latest_reading(
        &self,
        device_id: &str,
        unit: Option<&str>,
    ) -> DomainResult<Option<SensorReading>> {
        debug!(device_id = %device_id, unit = ?unit, "Getting latest reading");

        self.repository
            .get_latest_reading(GetLatestReadingRepoInput {
                device_id: device_id.to_string(),
                unit: unit.map(str::to_string),
            })
            .await
    }

    pub async fn get_reading_by_id(&self, id: i64) -> DomainResult<Option<SensorReading>> {
        self.repository.get_reading(GetReadingRepoInput { id }).await
    }

    /// At most `window_size` readings for the device, most recent first
    pub async fn get_recent_readings(
        &self,
        device_id: &str,
        window_size: usize,
    ) -> DomainResult<Vec<SensorReading>> {
        if window_size == 0 {
            return Ok(Vec::new());
        }

        let window_size = i64::try_from(window_size).map_err(|_| {
            DomainError::InvalidArgument(format!("window size too large: {}", window_size))
        })?;

        let mut readings = self
            .repository
            .get_recent_readings(GetRecentReadingsRepoInput {
                device_id: device_id.to_string(),
                window_size,
            })
            .await?;

        // window bound holds for every backend
        readings.truncate(window_size as usize);
        Ok(readings)
    }

    /// Administrative update. Returns `None` when the reading does not exist.
    pub async fn update_reading(
        &self,
        id: i64,
        input: UpdateReadingInput,
    ) -> DomainResult<Option<SensorReading>> {
        validate_with(&input, &self.limits)?;

        let updated = self
            .repository
            .update_reading(UpdateReadingRepoInput {
                id,
                reading_value: input.reading_value,
                reading_type: input.reading_type,
                unit: input.unit,
                battery_level: input.battery_level,
            })
            .await?;

        if updated.is_some() {
            info!(reading_id = id, "Sensor reading updated");
        }
        Ok(updated)
    }

    pub async fn list_devices(&self) -> DomainResult<Vec<String>> {
        let devices = self.repository.list_devices().await?;
        debug!(count = devices.len(), "Listed devices");
        Ok(devices)
    }
}

/// Store strings verbatim and everything else as compact JSON text
fn raw_data_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockSensorReadingRepository;
    use chrono::Utc;

    fn stored(input: &CreateReadingRepoInput, id: i64) -> SensorReading {
        let now = Utc::now();
        SensorReading {
            id,
            device_id: input.device_id.clone(),
            reading_value: input.reading_value,
            reading_type: input.reading_type.clone(),
            unit: input.unit.clone(),
            battery_level: input.battery_level,
            raw_data: input.raw_data.clone(),
            timestamp: input.timestamp,
            created_at: now,
            updated_at: now,
        }
    }

    fn valid_input() -> CreateReadingInput {
        CreateReadingInput {
            device_id: "sensor-001".to_string(),
            reading_value: 25.0,
            reading_type: "temperature".to_string(),
            unit: "C".to_string(),
            battery_level: Some(87.5),
            raw_data: Some(serde_json::json!({"rssi": -67})),
            timestamp: None,
        }
    }

    fn reading_with_value(id: i64, value: f64) -> SensorReading {
        let now = Utc::now();
        SensorReading {
            id,
            device_id: "sensor-001".to_string(),
            reading_value: value,
            reading_type: "temperature".to_string(),
            unit: "C".to_string(),
            battery_level: None,
            raw_data: None,
            timestamp: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_reading_assigns_timestamp() {
        // Arrange
        let mut mock_repo = MockSensorReadingRepository::new();
        let before = Utc::now();

        mock_repo
            .expect_create_reading()
            .withf(move |input: &CreateReadingRepoInput| {
                input.device_id == "sensor-001"
                    && input.timestamp >= before
                    && input.raw_data.as_deref() == Some(r#"{"rssi":-67}"#)
            })
            .times(1)
            .returning(|input| Ok(stored(&input, 1)));

        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        // Act
        let reading = service.create_reading(valid_input()).await.unwrap();

        // Assert
        assert_eq!(reading.id, 1);
        assert!((Utc::now() - reading.timestamp).num_seconds() < 5);
    }

    #[tokio::test]
    async fn test_create_reading_keeps_supplied_timestamp() {
        let mut mock_repo = MockSensorReadingRepository::new();
        let supplied = Utc::now() - chrono::Duration::minutes(10);

        mock_repo
            .expect_create_reading()
            .withf(move |input: &CreateReadingRepoInput| input.timestamp == supplied)
            .times(1)
            .returning(|input| Ok(stored(&input, 7)));

        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let mut input = valid_input();
        input.timestamp = Some(supplied);

        let reading = service.create_reading(input).await.unwrap();
        assert_eq!(reading.timestamp, supplied);
    }

    #[tokio::test]
    async fn test_create_reading_clamps_timestamp_within_skew() {
        // Arrange
        let mut mock_repo = MockSensorReadingRepository::new();
        let supplied = Utc::now() + chrono::Duration::seconds(4);

        mock_repo
            .expect_create_reading()
            .withf(|input: &CreateReadingRepoInput| input.timestamp <= Utc::now())
            .times(1)
            .returning(|input| Ok(stored(&input, 8)));

        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let mut input = valid_input();
        input.timestamp = Some(supplied);

        // Act
        let reading = service.create_reading(input).await.unwrap();

        // Assert
        assert!(reading.timestamp < supplied);
        assert!(reading.timestamp <= Utc::now());
    }

    #[tokio::test]
    async fn test_create_reading_below_floor_never_persists() {
        // Arrange: no expectations, any repository call fails the test
        let mock_repo = MockSensorReadingRepository::new();
        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let mut input = valid_input();
        input.reading_value = -150.0;

        // Act
        let result = service.create_reading(input).await;

        // Assert
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_create_reading_empty_device_id() {
        let mock_repo = MockSensorReadingRepository::new();
        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let mut input = valid_input();
        input.device_id = "".to_string();

        let result = service.create_reading(input).await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_create_reading_repository_error_propagates() {
        let mut mock_repo = MockSensorReadingRepository::new();
        mock_repo
            .expect_create_reading()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("connection reset"))));

        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let result = service.create_reading(valid_input()).await;
        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }

    #[tokio::test]
    async fn test_get_readings_rejects_negative_arguments() {
        let mock_repo = MockSensorReadingRepository::new();
        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        assert!(matches!(
            service.get_readings(-1, 10).await,
            Err(DomainError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.get_readings(0, -5).await,
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_get_readings_passes_paging() {
        let mut mock_repo = MockSensorReadingRepository::new();
        mock_repo
            .expect_list_readings()
            .withf(|input: &ListReadingsRepoInput| input.skip == 20 && input.limit == 10)
            .times(1)
            .returning(|_| Ok(vec![reading_with_value(1, 25.0)]));

        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let readings = service.get_readings(20, 10).await.unwrap();
        assert_eq!(readings.len(), 1);
    }

    #[tokio::test]
    async fn test_get_latest_reading_none_is_not_an_error() {
        let mut mock_repo = MockSensorReadingRepository::new();
        mock_repo
            .expect_get_latest_reading()
            .withf(|input: &GetLatestReadingRepoInput| {
                input.device_id == "sensor-404" && input.unit.as_deref() == Some("C")
            })
            .times(1)
            .returning(|_| Ok(None));

        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let result = service.get_latest_reading("sensor-404", Some("C")).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_get_recent_readings_bounded_by_window() {
        let mut mock_repo = MockSensorReadingRepository::new();
        mock_repo
            .expect_get_recent_readings()
            .withf(|input: &GetRecentReadingsRepoInput| input.window_size == 2)
            .times(1)
            .returning(|_| {
                Ok(vec![
                    reading_with_value(3, 30.0),
                    reading_with_value(2, 20.0),
                    reading_with_value(1, 10.0),
                ])
            });

        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let readings = service.get_recent_readings("sensor-001", 2).await.unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].id, 3);
    }

    #[tokio::test]
    async fn test_get_recent_readings_zero_window() {
        let mock_repo = MockSensorReadingRepository::new();
        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let readings = service.get_recent_readings("sensor-001", 0).await.unwrap();
        assert!(readings.is_empty());
    }

    #[tokio::test]
    async fn test_update_reading_validates_value() {
        let mock_repo = MockSensorReadingRepository::new();
        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let input = UpdateReadingInput {
            reading_value: Some(-500.0),
            ..Default::default()
        };

        let result = service.update_reading(1, input).await;
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_update_reading_rejects_blank_strings() {
        // Arrange: no expectations, any repository call fails the test
        let mock_repo = MockSensorReadingRepository::new();
        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let input = UpdateReadingInput {
            reading_type: Some("   ".to_string()),
            unit: Some(" ".to_string()),
            ..Default::default()
        };

        // Act
        let result = service.update_reading(1, input).await;

        // Assert
        match result {
            Err(DomainError::ValidationError(msg)) => {
                assert!(msg.contains("reading_type"));
                assert!(msg.contains("unit"));
            }
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_reading_missing_returns_none() {
        let mut mock_repo = MockSensorReadingRepository::new();
        mock_repo
            .expect_update_reading()
            .withf(|input: &UpdateReadingRepoInput| {
                input.id == 99 && input.reading_value == Some(12.0) && input.unit.is_none()
            })
            .times(1)
            .returning(|_| Ok(None));

        let service = SensorReadingService::new(Arc::new(mock_repo), ReadingLimits::default());

        let input = UpdateReadingInput {
            reading_value: Some(12.0),
            ..Default::default()
        };

        let result = service.update_reading(99, input).await.unwrap();
        assert!(result.is_none());
    }
}
