use crate::identifier::IdentifierCodec;

const SCHEMA_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS sensor_readings (
    id BIGSERIAL PRIMARY KEY,
    device_id TEXT NOT NULL,
    reading_value DOUBLE PRECISION NOT NULL,
    reading_type TEXT NOT NULL,
    unit TEXT NOT NULL,
    battery_level DOUBLE PRECISION,
    raw_data TEXT,
    timestamp TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_sensor_readings_device_timestamp
    ON sensor_readings (device_id, timestamp DESC, id DESC);
CREATE INDEX IF NOT EXISTS ix_sensor_readings_reading_type
    ON sensor_readings (reading_type);

CREATE TABLE IF NOT EXISTS raw_telemetry (
    id BIGSERIAL PRIMARY KEY,
    device_id TEXT NOT NULL,
    raw_data TEXT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    source TEXT NOT NULL,
    processed BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE INDEX IF NOT EXISTS ix_raw_telemetry_device_id
    ON raw_telemetry (device_id);

CREATE TABLE IF NOT EXISTS processed_readings (
    id BIGSERIAL PRIMARY KEY,
    device_id TEXT NOT NULL,
    reading_value DOUBLE PRECISION NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    raw_telemetry_id BIGINT REFERENCES raw_telemetry (id)
);
CREATE INDEX IF NOT EXISTS ix_processed_readings_device_id
    ON processed_readings (device_id);

CREATE TABLE IF NOT EXISTS rolling_averages (
    id {id_type} PRIMARY KEY,
    device_id TEXT NOT NULL,
    average_value DOUBLE PRECISION NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    window_size INTEGER NOT NULL,
    reading_type TEXT NOT NULL DEFAULT 'default',
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_rolling_averages_device_timestamp
    ON rolling_averages (device_id, timestamp DESC);
"#;

/// Idempotent DDL for all ingestion tables
pub fn schema_sql(codec: &dyn IdentifierCodec) -> String {
    SCHEMA_TEMPLATE.replace("{id_type}", codec.column_type())
}
