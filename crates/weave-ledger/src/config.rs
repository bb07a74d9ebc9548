//! Ledger configuration.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};

/// Where the pipeline reads submissions from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionSource {
    /// The relational submissions table
    #[default]
    Database,
    /// Listing `groups/{id}/videos/` in the object store
    ObjectStore,
}

impl FromStr for SubmissionSource {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(Self::Database),
            "object_store" | "objectstore" | "s3" => Ok(Self::ObjectStore),
            other => Err(LedgerError::config(format!("unknown SUBMISSION_SOURCE '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub submission_source: SubmissionSource,
}

impl LedgerConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            submission_source: SubmissionSource::default(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> LedgerResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| LedgerError::config("DATABASE_URL not set"))?;
        let mut config = Self::new(database_url);

        if let Ok(v) = std::env::var("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = v
                .parse()
                .map_err(|_| LedgerError::config(format!("invalid DATABASE_MAX_CONNECTIONS '{}'", v)))?;
        }
        if let Ok(v) = std::env::var("SUBMISSION_SOURCE") {
            config.submission_source = v.parse()?;
        }

        Ok(config)
    }

    /// Open a connection pool.
    pub async fn connect(&self) -> LedgerResult<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.database_url)
            .await?;
        info!(max_connections = self.max_connections, "Connected to ledger database");
        Ok(pool)
    }
}
