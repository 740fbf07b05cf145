//! Storage encodings for UUID identifiers.
//!
//! `rolling_averages.id` is a UUID. Where the column can hold a native `UUID`
//! it is stored as such; otherwise it is stored as its 36-character
//! hyphenated text form. The encoding is chosen once at startup and drives
//! both the schema bootstrap and every bind/read of the column.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use uuid::Uuid;

/// Converts identifiers between the domain `Uuid` and a column representation
pub trait IdentifierCodec: Send + Sync {
    /// SQL type used for identifier columns
    fn column_type(&self) -> &'static str;

    /// Value to bind as a query parameter
    fn encode(&self, id: Uuid) -> Box<dyn ToSql + Sync + Send>;

    /// Read an identifier column back into a `Uuid`
    fn decode(&self, row: &Row, column: &str) -> Result<Uuid>;
}

/// Postgres `UUID` column
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeUuidCodec;

impl IdentifierCodec for NativeUuidCodec {
    fn column_type(&self) -> &'static str {
        "UUID"
    }

    fn encode(&self, id: Uuid) -> Box<dyn ToSql + Sync + Send> {
        Box::new(id)
    }

    fn decode(&self, row: &Row, column: &str) -> Result<Uuid> {
        row.try_get::<_, Uuid>(column)
            .with_context(|| format!("Failed to read UUID column '{}'", column))
    }
}

/// Fixed-length `CHAR(36)` column holding the hyphenated form
#[derive(Debug, Clone, Copy, Default)]
pub struct Char36UuidCodec;

impl IdentifierCodec for Char36UuidCodec {
    fn column_type(&self) -> &'static str {
        "CHAR(36)"
    }

    fn encode(&self, id: Uuid) -> Box<dyn ToSql + Sync + Send> {
        Box::new(id.hyphenated().to_string())
    }

    fn decode(&self, row: &Row, column: &str) -> Result<Uuid> {
        let text: String = row
            .try_get(column)
            .with_context(|| format!("Failed to read CHAR(36) column '{}'", column))?;
        Uuid::parse_str(text.trim())
            .with_context(|| format!("Invalid identifier in column '{}': {}", column, text))
    }
}

/// Configuration-level selector for the identifier encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierEncoding {
    #[default]
    Native,
    Char36,
}

impl IdentifierEncoding {
    pub fn codec(self) -> Arc<dyn IdentifierCodec> {
        match self {
            IdentifierEncoding::Native => Arc::new(NativeUuidCodec),
            IdentifierEncoding::Char36 => Arc::new(Char36UuidCodec),
        }
    }
}

impl std::str::FromStr for IdentifierEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "uuid" => Ok(IdentifierEncoding::Native),
            "char36" | "char" | "text" => Ok(IdentifierEncoding::Char36),
            other => anyhow::bail!("Unknown identifier encoding: {}", other),
        }
    }
}
