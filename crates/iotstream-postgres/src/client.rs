use anyhow::{Context, Result};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::sync::Arc;
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::config::PostgresConfig;
use crate::identifier::IdentifierCodec;
use crate::schema::schema_sql;

/// PostgreSQL client wrapper with connection pooling
///
/// Constructed once at process start and passed explicitly to every
/// repository. Each repository operation checks a connection out of the pool
/// and returns it on drop, on success and error paths alike.
#[derive(Clone)]
pub struct PostgresClient {
    pool: Pool,
    codec: Arc<dyn IdentifierCodec>,
}

impl PostgresClient {
    /// Creates a new PostgreSQL client with connection pooling
    ///
    /// No connection is opened until the first checkout.
    pub fn new(config: &PostgresConfig) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.database.clone());
        cfg.user = Some(config.username.clone());
        cfg.password = Some(config.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create PostgreSQL pool")?;

        pool.resize(config.max_pool_size);

        Ok(Self {
            pool,
            codec: config.identifier_encoding.codec(),
        })
    }

    /// Pings the database to verify connectivity
    pub async fn ping(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client.execute("SELECT 1", &[]).await?;
        debug!("postgreSQL connection successful");
        Ok(())
    }

    /// Gets a connection from the pool
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .context("Failed to get PostgreSQL connection from pool")
    }

    pub fn identifier_codec(&self) -> Arc<dyn IdentifierCodec> {
        Arc::clone(&self.codec)
    }

    /// Creates the ingestion tables and indexes when they do not exist yet
    pub async fn bootstrap_schema(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .batch_execute(&schema_sql(self.codec.as_ref()))
            .await
            .context("Failed to bootstrap schema")?;
        info!(
            identifier_column = self.codec.column_type(),
            "PostgreSQL schema ready"
        );
        Ok(())
    }

    /// Closes the pool; checked-out connections are dropped when returned
    pub fn close(&self) {
        info!("Closing PostgreSQL pool");
        self.pool.close();
    }
}
