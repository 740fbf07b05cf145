use serde::{Deserialize, Serialize};

use crate::identifier::IdentifierEncoding;

/// PostgreSQL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_pool_size: usize,
    pub identifier_encoding: IdentifierEncoding,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "iotstream".to_string(),
            username: "iotstream".to_string(),
            password: "iotstream".to_string(),
            max_pool_size: 5,
            identifier_encoding: IdentifierEncoding::Native,
        }
    }
}
