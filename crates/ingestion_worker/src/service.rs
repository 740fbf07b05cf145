use std::sync::Arc;

use chrono::Utc;
use iotstream_domain::{
    CreateReadingInput, DomainError, MarkProcessedInput, RawTelemetry, RawTelemetryRepository,
    RollingAverageService, SensorReading, SensorReadingService, StageRawTelemetryInput,
};
use iotstream_nats::{BrokerMessage, QueueClient};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::IngestError;

/// Device id recorded for staged payloads that carry none
const UNKNOWN_DEVICE: &str = "unknown";

/// Which steps run around the reading write
#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub stage_raw_telemetry: bool,
    pub compute_rolling_average: bool,
    pub publish_reading_events: bool,
    pub raw_source_tag: String,
    /// `None` uses the calculator's default window
    pub rolling_window_size: Option<usize>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            stage_raw_telemetry: true,
            compute_rolling_average: true,
            publish_reading_events: false,
            raw_source_tag: "nats".to_string(),
            rolling_window_size: None,
        }
    }
}

/// Turns one broker message into a stored reading
pub struct IngestionService {
    readings: Arc<SensorReadingService>,
    averages: Arc<RollingAverageService>,
    raw_telemetry: Arc<dyn RawTelemetryRepository>,
    queue: Arc<QueueClient>,
    options: IngestionOptions,
}

impl IngestionService {
    pub fn new(
        readings: Arc<SensorReadingService>,
        averages: Arc<RollingAverageService>,
        raw_telemetry: Arc<dyn RawTelemetryRepository>,
        queue: Arc<QueueClient>,
        options: IngestionOptions,
    ) -> Self {
        Self {
            readings,
            averages,
            raw_telemetry,
            queue,
            options,
        }
    }

    /// Decode, validate and persist a single message.
    ///
    /// Follow-up steps after a successful write (processed flag, rolling
    /// average, event) log their failures and never fail the message.
    pub async fn ingest(&self, message: &BrokerMessage) -> Result<SensorReading, IngestError> {
        let text = std::str::from_utf8(&message.payload)
            .map_err(|e| IngestError::Decode(e.to_string()))?;
        let value: Value =
            serde_json::from_str(text).map_err(|e| IngestError::Decode(e.to_string()))?;

        let staged = if self.options.stage_raw_telemetry {
            self.stage(message, text, &value).await
        } else {
            None
        };

        let input: CreateReadingInput =
            serde_json::from_value(value).map_err(|e| IngestError::Validation(e.to_string()))?;

        let reading = self
            .readings
            .create_reading(input)
            .await
            .map_err(|e| match e {
                DomainError::ValidationError(msg) | DomainError::InvalidArgument(msg) => {
                    IngestError::Validation(msg)
                }
                source => IngestError::Persistence {
                    raw_telemetry_id: staged.as_ref().map(|raw| raw.id),
                    source,
                },
            })?;

        self.follow_up(&reading, staged.as_ref()).await;
        Ok(reading)
    }

    async fn stage(&self, message: &BrokerMessage, text: &str, value: &Value) -> Option<RawTelemetry> {
        let device_id = value
            .get("device_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or(message.key.as_deref())
            .unwrap_or(UNKNOWN_DEVICE);

        let result = self
            .raw_telemetry
            .stage(StageRawTelemetryInput {
                device_id: device_id.to_string(),
                raw_data: text.to_string(),
                timestamp: Utc::now(),
                source: self.options.raw_source_tag.clone(),
            })
            .await;

        match result {
            Ok(raw) => {
                debug!(raw_telemetry_id = raw.id, device_id = %raw.device_id, "Raw telemetry staged");
                Some(raw)
            }
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Failed to stage raw telemetry");
                None
            }
        }
    }

    async fn follow_up(&self, reading: &SensorReading, staged: Option<&RawTelemetry>) {
        if let Some(raw) = staged {
            let marked = self
                .raw_telemetry
                .mark_processed(MarkProcessedInput {
                    raw_telemetry_id: raw.id,
                    device_id: reading.device_id.clone(),
                    reading_value: reading.reading_value,
                    timestamp: reading.timestamp,
                })
                .await;
            if let Err(e) = marked {
                warn!(raw_telemetry_id = raw.id, error = %e, "Failed to mark raw telemetry processed");
            }
        }

        if self.options.compute_rolling_average {
            match self
                .averages
                .compute_and_store(&reading.device_id, self.options.rolling_window_size)
                .await
            {
                Ok(Some(average)) => debug!(
                    device_id = %reading.device_id,
                    average = average.average_value,
                    window_size = average.window_size,
                    "Rolling average updated"
                ),
                Ok(None) => {}
                Err(e) => warn!(
                    device_id = %reading.device_id,
                    error = %e,
                    "Failed to update rolling average"
                ),
            }
        }

        if self.options.publish_reading_events
            && !self
                .queue
                .publish_reading_event(&reading.device_id, reading.reading_value)
                .await
        {
            warn!(device_id = %reading.device_id, "Reading event not published");
        }

        info!(
            reading_id = reading.id,
            device_id = %reading.device_id,
            "Reading ingested"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotstream_domain::{
        CreateReadingRepoInput, MockRawTelemetryRepository, MockRollingAverageRepository,
        MockSensorReadingRepository, ProcessedReading, ReadingLimits, RollingAverage,
    };
    use iotstream_nats::{
        JetStreamPublisher, MockBrokerConnector, MockJetStreamPublisher, QueueClientConfig,
    };

    fn stored(input: CreateReadingRepoInput, id: i64) -> SensorReading {
        let now = Utc::now();
        SensorReading {
            id,
            device_id: input.device_id,
            reading_value: input.reading_value,
            reading_type: input.reading_type,
            unit: input.unit,
            battery_level: input.battery_level,
            raw_data: input.raw_data,
            timestamp: input.timestamp,
            created_at: now,
            updated_at: now,
        }
    }

    fn staged(input: StageRawTelemetryInput, id: i64) -> RawTelemetry {
        RawTelemetry {
            id,
            device_id: input.device_id,
            raw_data: input.raw_data,
            timestamp: input.timestamp,
            source: input.source,
            processed: false,
        }
    }

    fn service(
        readings: MockSensorReadingRepository,
        averages: MockRollingAverageRepository,
        raw: MockRawTelemetryRepository,
        connector: MockBrokerConnector,
        options: IngestionOptions,
    ) -> IngestionService {
        let readings: Arc<MockSensorReadingRepository> = Arc::new(readings);
        IngestionService::new(
            Arc::new(SensorReadingService::new(
                readings.clone(),
                ReadingLimits::default(),
            )),
            Arc::new(RollingAverageService::new(readings, Arc::new(averages), 10)),
            Arc::new(raw),
            Arc::new(QueueClient::new(
                Arc::new(connector),
                QueueClientConfig::default(),
            )),
            options,
        )
    }

    fn message(payload: &str) -> BrokerMessage {
        BrokerMessage::new("iot_stream_v1.dev-1", payload.to_string()).with_key("dev-1")
    }

    const VALID: &str =
        r#"{"device_id":"dev-1","reading_value":21.5,"reading_type":"temperature","unit":"C"}"#;

    #[tokio::test]
    async fn test_ingest_valid_message_runs_follow_ups() {
        // Arrange
        let mut readings = MockSensorReadingRepository::new();
        readings
            .expect_create_reading()
            .withf(|input| input.device_id == "dev-1" && input.reading_value == 21.5)
            .times(1)
            .returning(|input| Ok(stored(input, 7)));
        readings
            .expect_get_recent_readings()
            .withf(|input| input.device_id == "dev-1" && input.window_size == 10)
            .times(1)
            .returning(|_| {
                Ok(vec![stored(
                    CreateReadingRepoInput {
                        device_id: "dev-1".to_string(),
                        reading_value: 21.5,
                        reading_type: "temperature".to_string(),
                        unit: "C".to_string(),
                        battery_level: None,
                        raw_data: None,
                        timestamp: Utc::now(),
                    },
                    7,
                )])
            });

        let mut raw = MockRawTelemetryRepository::new();
        raw.expect_stage()
            .withf(|input| input.device_id == "dev-1" && input.source == "nats" && input.raw_data == VALID)
            .times(1)
            .returning(|input| Ok(staged(input, 3)));
        raw.expect_mark_processed()
            .withf(|input| input.raw_telemetry_id == 3 && input.reading_value == 21.5)
            .times(1)
            .returning(|input| {
                Ok(ProcessedReading {
                    id: 1,
                    device_id: input.device_id,
                    reading_value: input.reading_value,
                    timestamp: input.timestamp,
                    raw_telemetry_id: Some(input.raw_telemetry_id),
                })
            });

        let mut averages = MockRollingAverageRepository::new();
        averages
            .expect_create_rolling_average()
            .withf(|input| input.average_value == 21.5 && input.window_size == 1)
            .times(1)
            .returning(|input| {
                Ok(RollingAverage {
                    id: input.id,
                    device_id: input.device_id,
                    average_value: input.average_value,
                    timestamp: input.timestamp,
                    window_size: input.window_size,
                    reading_type: input.reading_type,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
            });

        // events are off by default: the connector must not be touched
        let service = service(
            readings,
            averages,
            raw,
            MockBrokerConnector::new(),
            IngestionOptions::default(),
        );

        // Act
        let reading = service.ingest(&message(VALID)).await.unwrap();

        // Assert
        assert_eq!(reading.id, 7);
        assert_eq!(reading.reading_type, "temperature");
    }

    #[tokio::test]
    async fn test_ingest_malformed_json_is_decode_error() {
        // Arrange: no repository expectations, any call panics
        let service = service(
            MockSensorReadingRepository::new(),
            MockRollingAverageRepository::new(),
            MockRawTelemetryRepository::new(),
            MockBrokerConnector::new(),
            IngestionOptions::default(),
        );

        // Act
        let result = service.ingest(&message("{not json")).await;

        // Assert
        assert!(matches!(result, Err(IngestError::Decode(_))));
    }

    #[tokio::test]
    async fn test_ingest_non_utf8_is_decode_error() {
        let service = service(
            MockSensorReadingRepository::new(),
            MockRollingAverageRepository::new(),
            MockRawTelemetryRepository::new(),
            MockBrokerConnector::new(),
            IngestionOptions::default(),
        );

        let result = service
            .ingest(&BrokerMessage::new("iot_stream_v1._", vec![0xff, 0xfe, 0x00]))
            .await;

        assert!(matches!(result, Err(IngestError::Decode(_))));
    }

    #[tokio::test]
    async fn test_ingest_invalid_reading_is_staged_but_not_written() {
        // Arrange
        let mut raw = MockRawTelemetryRepository::new();
        raw.expect_stage()
            .times(1)
            .returning(|input| Ok(staged(input, 4)));
        raw.expect_mark_processed().times(0);

        let service = service(
            MockSensorReadingRepository::new(),
            MockRollingAverageRepository::new(),
            raw,
            MockBrokerConnector::new(),
            IngestionOptions::default(),
        );

        let below_floor =
            r#"{"device_id":"dev-1","reading_value":-500.0,"reading_type":"temperature","unit":"C"}"#;

        // Act
        let result = service.ingest(&message(below_floor)).await;

        // Assert
        assert!(matches!(result, Err(IngestError::Validation(_))));
    }

    #[tokio::test]
    async fn test_ingest_missing_field_is_validation_error() {
        let options = IngestionOptions {
            stage_raw_telemetry: false,
            ..IngestionOptions::default()
        };
        let service = service(
            MockSensorReadingRepository::new(),
            MockRollingAverageRepository::new(),
            MockRawTelemetryRepository::new(),
            MockBrokerConnector::new(),
            options,
        );

        let result = service
            .ingest(&message(r#"{"device_id":"dev-1","reading_value":1.0}"#))
            .await;

        assert!(matches!(result, Err(IngestError::Validation(_))));
    }

    #[tokio::test]
    async fn test_ingest_storage_failure_reports_staged_id() {
        // Arrange
        let mut readings = MockSensorReadingRepository::new();
        readings
            .expect_create_reading()
            .times(1)
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("pool timed out"))));

        let mut raw = MockRawTelemetryRepository::new();
        raw.expect_stage()
            .returning(|input| Ok(staged(input, 9)));

        let service = service(
            readings,
            MockRollingAverageRepository::new(),
            raw,
            MockBrokerConnector::new(),
            IngestionOptions::default(),
        );

        // Act
        let result = service.ingest(&message(VALID)).await;

        // Assert
        assert!(matches!(
            result,
            Err(IngestError::Persistence {
                raw_telemetry_id: Some(9),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_follow_up_failures_do_not_fail_ingest() {
        // Arrange
        let mut readings = MockSensorReadingRepository::new();
        readings
            .expect_create_reading()
            .returning(|input| Ok(stored(input, 11)));
        readings
            .expect_get_recent_readings()
            .returning(|_| Err(DomainError::RepositoryError(anyhow::anyhow!("connection reset"))));

        let mut raw = MockRawTelemetryRepository::new();
        raw.expect_stage()
            .returning(|input| Ok(staged(input, 5)));
        raw.expect_mark_processed()
            .returning(|input| Err(DomainError::RawTelemetryAlreadyProcessed(input.raw_telemetry_id)));

        let mut connector = MockBrokerConnector::new();
        connector
            .expect_connect_producer()
            .returning(|| Err(anyhow::anyhow!("no servers available")));

        let options = IngestionOptions {
            publish_reading_events: true,
            ..IngestionOptions::default()
        };
        let service = service(
            readings,
            MockRollingAverageRepository::new(),
            raw,
            connector,
            options,
        );

        // Act
        let result = service.ingest(&message(VALID)).await;

        // Assert
        assert_eq!(result.unwrap().id, 11);
    }

    #[tokio::test]
    async fn test_publishes_reading_event_when_enabled() {
        // Arrange
        let mut readings = MockSensorReadingRepository::new();
        readings
            .expect_create_reading()
            .returning(|input| Ok(stored(input, 12)));

        let mut producer = MockJetStreamPublisher::new();
        producer
            .expect_publish()
            .withf(|subject, key, _| {
                subject == "telemetry-events.dev-1" && key.as_deref() == Some("dev-1")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let producer: Arc<dyn JetStreamPublisher> = Arc::new(producer);

        let mut connector = MockBrokerConnector::new();
        connector
            .expect_connect_producer()
            .times(1)
            .returning(move || Ok(Arc::clone(&producer)));

        let options = IngestionOptions {
            stage_raw_telemetry: false,
            compute_rolling_average: false,
            publish_reading_events: true,
            ..IngestionOptions::default()
        };
        let service = service(
            readings,
            MockRollingAverageRepository::new(),
            MockRawTelemetryRepository::new(),
            connector,
            options,
        );

        // Act / Assert
        assert_eq!(service.ingest(&message(VALID)).await.unwrap().id, 12);
    }
}
