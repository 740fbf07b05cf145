use chrono::{DateTime, Utc};
use iotstream_domain::{ProcessedReading, RawTelemetry, SensorReading};
use tokio_postgres::Row;

pub(crate) const SENSOR_READING_COLUMNS: &str = "id, device_id, reading_value, reading_type, unit, \
     battery_level, raw_data, timestamp, created_at, updated_at";

pub(crate) const RAW_TELEMETRY_COLUMNS: &str =
    "id, device_id, raw_data, timestamp, source, processed";

/// sensor_readings row
#[derive(Debug, Clone)]
pub struct SensorReadingRow {
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

impl From<&Row> for SensorReadingRow {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            device_id: row.get("device_id"),
            reading_value: row.get("reading_value"),
            reading_type: row.get("reading_type"),
            unit: row.get("unit"),
            battery_level: row.get("battery_level"),
            raw_data: row.get("raw_data"),
            timestamp: row.get("timestamp"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl From<SensorReadingRow> for SensorReading {
    fn from(row: SensorReadingRow) -> Self {
        SensorReading {
            id: row.id,
            device_id: row.device_id,
            reading_value: row.reading_value,
            reading_type: row.reading_type,
            unit: row.unit,
            battery_level: row.battery_level,
            raw_data: row.raw_data,
            timestamp: row.timestamp,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// raw_telemetry row
#[derive(Debug, Clone)]
pub struct RawTelemetryRow {
    pub id: i64,
    pub device_id: String,
    pub raw_data: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub processed: bool,
}

impl From<&Row> for RawTelemetryRow {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            device_id: row.get("device_id"),
            raw_data: row.get("raw_data"),
            timestamp: row.get("timestamp"),
            source: row.get("source"),
            processed: row.get("processed"),
        }
    }
}

impl From<RawTelemetryRow> for RawTelemetry {
    fn from(row: RawTelemetryRow) -> Self {
        RawTelemetry {
            id: row.id,
            device_id: row.device_id,
            raw_data: row.raw_data,
            timestamp: row.timestamp,
            source: row.source,
            processed: row.processed,
        }
    }
}

/// processed_readings row
#[derive(Debug, Clone)]
pub struct ProcessedReadingRow {
    pub id: i64,
    pub device_id: String,
    pub reading_value: f64,
    pub timestamp: DateTime<Utc>,
    pub raw_telemetry_id: Option<i64>,
}

impl From<ProcessedReadingRow> for ProcessedReading {
    fn from(row: ProcessedReadingRow) -> Self {
        ProcessedReading {
            id: row.id,
            device_id: row.device_id,
            reading_value: row.reading_value,
            timestamp: row.timestamp,
            raw_telemetry_id: row.raw_telemetry_id,
        }
    }
}
