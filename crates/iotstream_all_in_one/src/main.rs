mod config;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use config::ServiceConfig;
use ingestion_worker::{IngestionService, IngestionWorker};
use iotstream_domain::{RollingAverageService, SensorReadingService};
use iotstream_nats::{NatsConnector, QueueClient};
use iotstream_postgres::{
    PostgresClient, PostgresRawTelemetryRepository, PostgresRollingAverageRepository,
    PostgresSensorReadingRepository,
};
use iotstream_runner::Runner;
use telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        ingest_topic = %config.ingest_topic,
        otel_enabled = config.otel_enabled,
        "Starting iotstream-all-in-one"
    );
    debug!("Configuration: {:?}", config.redacted());

    let postgres_client = match initialize_postgres(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to initialize PostgreSQL");
            std::process::exit(1);
        }
    };

    let sensor_readings = Arc::new(PostgresSensorReadingRepository::new(
        postgres_client.clone(),
    ));
    let reading_service = Arc::new(SensorReadingService::new(
        sensor_readings.clone(),
        config.reading_limits(),
    ));
    let rolling_average_service = Arc::new(RollingAverageService::new(
        sensor_readings,
        Arc::new(PostgresRollingAverageRepository::new(postgres_client.clone())),
        config.rolling_window_size,
    ));

    let queue = Arc::new(QueueClient::new(
        Arc::new(NatsConnector::new(config.connector_config())),
        config.queue_client_config(),
    ));

    let ingestion_service = Arc::new(IngestionService::new(
        reading_service,
        rolling_average_service,
        Arc::new(PostgresRawTelemetryRepository::new(postgres_client.clone())),
        Arc::clone(&queue),
        config.ingestion_options(),
    ));

    let worker = IngestionWorker::new(queue, ingestion_service, config.worker_config());

    Runner::new()
        .with_named_process("ingestion_worker", worker.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            postgres_client.close();
            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;
}

async fn initialize_postgres(config: &ServiceConfig) -> anyhow::Result<PostgresClient> {
    info!(
        host = %config.postgres_host,
        database = %config.postgres_database,
        "Initializing PostgreSQL"
    );

    let client = PostgresClient::new(&config.postgres_config())?;
    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);

    tokio::time::timeout(startup_timeout, client.ping())
        .await
        .context("Timed out connecting to PostgreSQL")??;
    client.bootstrap_schema().await?;

    Ok(client)
}
