use std::time::Duration;

use config::{Config, ConfigError, Environment};
use ingestion_worker::{IngestionOptions, IngestionWorkerConfig};
use iotstream_domain::ReadingLimits;
use iotstream_nats::{NatsConnectorConfig, QueueClientConfig};
use iotstream_postgres::{IdentifierEncoding, PostgresConfig};
use serde::{Deserialize, Serialize};

/// Service configuration, read from `IOTSTREAM_*` environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Topic the worker consumes readings from
    #[serde(default = "default_ingest_topic")]
    pub ingest_topic: String,

    /// Topic reading events are published on
    #[serde(default = "default_events_topic")]
    pub events_topic: String,

    /// Durable consumer name shared by every worker instance
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    #[serde(default = "default_nats_batch_size")]
    pub nats_batch_size: usize,

    /// Max wait for a batch in milliseconds
    #[serde(default = "default_nats_fetch_timeout_ms")]
    pub nats_fetch_timeout_ms: u64,

    /// Connection timeout for NATS and PostgreSQL at startup, in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // PostgreSQL
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// `native` (UUID column) or `char36` (hyphenated text)
    #[serde(default)]
    pub identifier_encoding: IdentifierEncoding,

    // Ingestion
    /// Readings below this value are rejected
    #[serde(default = "default_min_reading_value")]
    pub min_reading_value: f64,

    /// Tolerated skew for client timestamps, in seconds
    #[serde(default = "default_max_clock_skew_secs")]
    pub max_clock_skew_secs: i64,

    #[serde(default = "default_rolling_window_size")]
    pub rolling_window_size: usize,

    #[serde(default = "default_true")]
    pub stage_raw_telemetry: bool,

    #[serde(default = "default_true")]
    pub compute_rolling_average: bool,

    #[serde(default)]
    pub publish_reading_events: bool,

    /// `source` recorded on staged raw telemetry
    #[serde(default = "default_raw_source_tag")]
    pub raw_source_tag: String,

    // OpenTelemetry
    /// OTLP endpoint (gRPC)
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default)]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_ingest_topic() -> String {
    iotstream_nats::DEFAULT_INGEST_TOPIC.to_string()
}

fn default_events_topic() -> String {
    iotstream_nats::DEFAULT_EVENTS_TOPIC.to_string()
}

fn default_consumer_name() -> String {
    "iotstream-ingestion-worker".to_string()
}

fn default_nats_batch_size() -> usize {
    iotstream_nats::DEFAULT_BATCH_SIZE
}

fn default_nats_fetch_timeout_ms() -> u64 {
    1000
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "iotstream".to_string()
}

fn default_postgres_username() -> String {
    "iotstream".to_string()
}

fn default_postgres_password() -> String {
    "iotstream".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    5
}

fn default_min_reading_value() -> f64 {
    -100.0
}

fn default_max_clock_skew_secs() -> i64 {
    5
}

fn default_rolling_window_size() -> usize {
    iotstream_domain::DEFAULT_WINDOW_SIZE
}

fn default_true() -> bool {
    true
}

fn default_raw_source_tag() -> String {
    "nats".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "iotstream-all-in-one".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("IOTSTREAM"))
            .build()?
            .try_deserialize()
    }

    /// Copy safe to log: secrets are masked
    pub fn redacted(&self) -> Self {
        Self {
            postgres_password: "***".to_string(),
            ..self.clone()
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            identifier_encoding: self.identifier_encoding,
        }
    }

    pub fn connector_config(&self) -> NatsConnectorConfig {
        NatsConnectorConfig {
            url: self.nats_url.clone(),
            connect_timeout: Duration::from_secs(self.startup_timeout_secs),
            consumer_name: self.consumer_name.clone(),
            publish_topics: if self.publish_reading_events {
                vec![self.events_topic.clone()]
            } else {
                Vec::new()
            },
        }
    }

    pub fn queue_client_config(&self) -> QueueClientConfig {
        QueueClientConfig {
            ingest_topic: self.ingest_topic.clone(),
            events_topic: self.events_topic.clone(),
            batch_size: self.nats_batch_size,
        }
    }

    pub fn reading_limits(&self) -> ReadingLimits {
        ReadingLimits {
            min_reading_value: self.min_reading_value,
            max_clock_skew: chrono::Duration::seconds(self.max_clock_skew_secs),
        }
    }

    pub fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            stage_raw_telemetry: self.stage_raw_telemetry,
            compute_rolling_average: self.compute_rolling_average,
            publish_reading_events: self.publish_reading_events,
            raw_source_tag: self.raw_source_tag.clone(),
            rolling_window_size: Some(self.rolling_window_size),
        }
    }

    pub fn worker_config(&self) -> IngestionWorkerConfig {
        IngestionWorkerConfig {
            fetch_timeout: Duration::from_millis(self.nats_fetch_timeout_ms),
        }
    }
}
