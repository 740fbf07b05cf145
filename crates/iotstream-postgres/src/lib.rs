mod client;
mod config;
mod identifier;
mod models;
mod raw_telemetry_repository;
mod rolling_average_repository;
mod schema;
mod sensor_reading_repository;

pub use client::PostgresClient;
pub use config::PostgresConfig;
pub use identifier::{Char36UuidCodec, IdentifierCodec, IdentifierEncoding, NativeUuidCodec};
pub use models::{ProcessedReadingRow, RawTelemetryRow, SensorReadingRow};
pub use raw_telemetry_repository::PostgresRawTelemetryRepository;
pub use rolling_average_repository::PostgresRollingAverageRepository;
pub use schema::schema_sql;
pub use sensor_reading_repository::PostgresSensorReadingRepository;
