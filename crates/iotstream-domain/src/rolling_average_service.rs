use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::repository::{RollingAverageRepository, SensorReadingRepository};
use crate::types::{CreateRollingAverageRepoInput, GetRecentReadingsRepoInput, RollingAverage, SensorReading};

pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Tag used when a window mixes readings of different types
pub const MIXED_READING_TYPE: &str = "default";

/// Computes windowed means over the most recent readings of a device
///
/// A device without history is a normal state and yields `None`.
pub struct RollingAverageService {
    readings: Arc<dyn SensorReadingRepository>,
    averages: Arc<dyn RollingAverageRepository>,
    default_window_size: usize,
}

impl RollingAverageService {
    pub fn new(
        readings: Arc<dyn SensorReadingRepository>,
        averages: Arc<dyn RollingAverageRepository>,
        default_window_size: usize,
    ) -> Self {
        Self {
            readings,
            averages,
            default_window_size,
        }
    }

    pub async fn compute_rolling_average(
        &self,
        device_id: &str,
        window_size: Option<usize>,
    ) -> DomainResult<Option<f64>> {
        let window = self.fetch_window(device_id, window_size).await?;
        Ok(mean(&window))
    }

    /// Compute the average and persist it as a new `RollingAverage` row.
    ///
    /// `window_size` on the stored row is the number of samples actually used,
    /// which is less than requested when the device has fewer readings.
    pub async fn compute_and_store(
        &self,
        device_id: &str,
        window_size: Option<usize>,
    ) -> DomainResult<Option<RollingAverage>> {
        let window = self.fetch_window(device_id, window_size).await?;
        let Some(average_value) = mean(&window) else {
            debug!(device_id = %device_id, "No readings, skipping rolling average");
            return Ok(None);
        };

        let stored = self
            .averages
            .create_rolling_average(CreateRollingAverageRepoInput {
                id: Uuid::new_v4(),
                device_id: device_id.to_string(),
                average_value,
                timestamp: chrono::Utc::now(),
                window_size: window.len(),
                reading_type: window_reading_type(&window),
            })
            .await?;

        info!(
            device_id = %device_id,
            average = stored.average_value,
            window_size = stored.window_size,
            "Stored rolling average"
        );
        Ok(Some(stored))
    }

    pub async fn latest_rolling_average(
        &self,
        device_id: &str,
    ) -> DomainResult<Option<RollingAverage>> {
        self.averages.get_latest_rolling_average(device_id).await
    }

    async fn fetch_window(
        &self,
        device_id: &str,
        window_size: Option<usize>,
    ) -> DomainResult<Vec<SensorReading>> {
        if device_id.trim().is_empty() {
            return Err(DomainError::InvalidArgument(
                "device ID cannot be empty".to_string(),
            ));
        }

        let window_size = window_size.unwrap_or(self.default_window_size);
        if window_size == 0 {
            return Err(DomainError::InvalidArgument(
                "window size must be at least 1".to_string(),
            ));
        }

        let limit = i64::try_from(window_size).map_err(|_| {
            DomainError::InvalidArgument(format!("window size too large: {}", window_size))
        })?;

        let mut readings = self
            .readings
            .get_recent_readings(GetRecentReadingsRepoInput {
                device_id: device_id.to_string(),
                window_size: limit,
            })
            .await?;
        readings.truncate(window_size);

        debug!(
            device_id = %device_id,
            requested = window_size,
            found = readings.len(),
            "Fetched rolling average window"
        );
        Ok(readings)
    }
}

fn mean(readings: &[SensorReading]) -> Option<f64> {
    if readings.is_empty() {
        return None;
    }
    let sum: f64 = readings.iter().map(|r| r.reading_value).sum();
    Some(sum / readings.len() as f64)
}

fn window_reading_type(readings: &[SensorReading]) -> String {
    match readings.split_first() {
        Some((first, rest)) if rest.iter().all(|r| r.reading_type == first.reading_type) => {
            first.reading_type.clone()
        }
        _ => MIXED_READING_TYPE.to_string(),
    }
}
