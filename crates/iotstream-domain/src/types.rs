use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validate::{non_blank, not_in_future, reading_in_range, ReadingLimits};

/// Domain representation of a persisted sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub id: i64,
    pub device_id: String,
    pub reading_value: f64,
    pub reading_type: String,
    pub unit: String,
    pub battery_level: Option<f64>,
    pub raw_data: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inbound reading shape, shared by the worker and any API collaborator.
///
/// `timestamp` is optional on the wire; the gateway assigns the current time
/// when it is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[garde(context(ReadingLimits))]
pub struct CreateReadingInput {
    #[garde(custom(non_blank))]
    pub device_id: String,
    #[garde(custom(reading_in_range))]
    pub reading_value: f64,
    #[garde(custom(non_blank))]
    pub reading_type: String,
    #[garde(custom(non_blank))]
    pub unit: String,
    #[serde(default)]
    #[garde(range(min = 0.0, max = 100.0))]
    pub battery_level: Option<f64>,
    #[serde(default)]
    #[garde(skip)]
    pub raw_data: Option<serde_json::Value>,
    #[serde(default)]
    #[garde(custom(not_in_future))]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Administrative partial update of a reading. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[garde(context(ReadingLimits))]
pub struct UpdateReadingInput {
    #[serde(default)]
    #[garde(custom(optional_reading_in_range))]
    pub reading_value: Option<f64>,
    #[serde(default)]
    #[garde(custom(optional_non_blank))]
    pub reading_type: Option<String>,
    #[serde(default)]
    #[garde(custom(optional_non_blank))]
    pub unit: Option<String>,
    #[serde(default)]
    #[garde(range(min = 0.0, max = 100.0))]
    pub battery_level: Option<f64>,
}

fn optional_non_blank(value: &Option<String>, limits: &ReadingLimits) -> garde::Result {
    match value {
        Some(v) => non_blank(v, limits),
        None => Ok(()),
    }
}

fn optional_reading_in_range(value: &Option<f64>, limits: &ReadingLimits) -> garde::Result {
    match value {
        Some(v) => reading_in_range(v, limits),
        None => Ok(()),
    }
}

/// Input for inserting a reading; the repository assigns `id`, `created_at` and `updated_at`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateReadingRepoInput {
    pub device_id: String,
    pub reading_value: f64,
    pub reading_type: String,
    pub unit: String,
    pub battery_level: Option<f64>,
    pub raw_data: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListReadingsRepoInput {
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetReadingRepoInput {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetLatestReadingRepoInput {
    pub device_id: String,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRecentReadingsRepoInput {
    pub device_id: String,
    pub window_size: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReadingRepoInput {
    pub id: i64,
    pub reading_value: Option<f64>,
    pub reading_type: Option<String>,
    pub unit: Option<String>,
    pub battery_level: Option<f64>,
}

/// A message as received, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTelemetry {
    pub id: i64,
    pub device_id: String,
    pub raw_data: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub processed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRawTelemetryInput {
    pub device_id: String,
    pub raw_data: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// Reading derived from a staged raw telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedReading {
    pub id: i64,
    pub device_id: String,
    pub reading_value: f64,
    pub timestamp: DateTime<Utc>,
    pub raw_telemetry_id: Option<i64>,
}

/// Links a staged raw record to the reading derived from it and flips its processed flag
#[derive(Debug, Clone, PartialEq)]
pub struct MarkProcessedInput {
    pub raw_telemetry_id: i64,
    pub device_id: String,
    pub reading_value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Windowed mean over the most recent readings of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingAverage {
    pub id: Uuid,
    pub device_id: String,
    pub average_value: f64,
    pub timestamp: DateTime<Utc>,
    pub window_size: usize,
    pub reading_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRollingAverageRepoInput {
    pub id: Uuid,
    pub device_id: String,
    pub average_value: f64,
    pub timestamp: DateTime<Utc>,
    pub window_size: usize,
    pub reading_type: String,
}
