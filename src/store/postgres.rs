//! PostgreSQL session and resolution store.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! Networks, transforms and variables are stored as JSONB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Executor, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::types::{Attributes, Network, ProtocolId, Resolution, ResolutionId, Session, SessionId, Transform};
use super::{CascadeReport, ResolutionOptions, ResolutionStore, SessionStore, StoreError};

/// Schema for the session and resolution tables.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS resolver_sessions (
    protocol_id TEXT NOT NULL,
    id          TEXT NOT NULL,
    date        TIMESTAMPTZ NOT NULL,
    network     JSONB NOT NULL,
    variables   JSONB NOT NULL DEFAULT '{}'::jsonb,
    PRIMARY KEY (protocol_id, id)
);

CREATE TABLE IF NOT EXISTS resolver_resolutions (
    protocol_id TEXT NOT NULL,
    id          TEXT NOT NULL,
    sequence    BIGSERIAL,
    date        TIMESTAMPTZ NOT NULL,
    transforms  JSONB NOT NULL,
    parameters  JSONB,
    PRIMARY KEY (protocol_id, id)
);

CREATE INDEX IF NOT EXISTS idx_resolver_resolutions_order
    ON resolver_resolutions (protocol_id, date, sequence);
"#;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/resolver".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Idle connections.
    pub idle: usize,
    /// Configured maximum.
    pub max: u32,
}

/// PostgreSQL store.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, StoreError> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Create the tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.pool.execute(SCHEMA).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    fn parse_session_row(row: &PgRow) -> Result<Session, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let date: DateTime<Utc> = row.try_get("date")?;
        let Json(network): Json<Network> = row.try_get("network")?;
        let Json(variables): Json<Attributes> = row.try_get("variables")?;

        Ok(Session {
            id: SessionId::new(id),
            date,
            network,
            variables,
        })
    }

    fn parse_resolution_row(row: &PgRow) -> Result<Resolution, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let date: DateTime<Utc> = row.try_get("date")?;
        let sequence: i64 = row.try_get("sequence")?;
        let Json(transforms): Json<Vec<Transform>> = row.try_get("transforms")?;
        let parameters: Option<Json<serde_json::Value>> = row.try_get("parameters")?;

        Ok(Resolution {
            id: ResolutionId::new(id),
            date,
            sequence: sequence.max(0) as u64,
            transforms,
            parameters: parameters.map(|Json(v)| v).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn find_all(&self, protocol: &ProtocolId) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, date, network, variables
            FROM resolver_sessions
            WHERE protocol_id = $1
            ORDER BY date, id
            "#,
        )
        .bind(protocol.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| Self::parse_session_row(r).map_err(StoreError::from))
            .collect()
    }

    async fn insert_session(&self, protocol: &ProtocolId, session: Session) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO resolver_sessions (protocol_id, id, date, network, variables)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (protocol_id, id) DO NOTHING
            "#,
        )
        .bind(protocol.as_str())
        .bind(session.id.as_str())
        .bind(session.date)
        .bind(Json(&session.network))
        .bind(Json(&session.variables))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateSession(session.id));
        }
        Ok(())
    }

    async fn delete_session(
        &self,
        protocol: &ProtocolId,
        id: &SessionId,
    ) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            DELETE FROM resolver_sessions
            WHERE protocol_id = $1 AND id = $2
            RETURNING id, date, network, variables
            "#,
        )
        .bind(protocol.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::parse_session_row).transpose()?)
    }

    async fn delete_session_cascade(
        &self,
        protocol: &ProtocolId,
        id: &SessionId,
    ) -> Result<Option<CascadeReport>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            DELETE FROM resolver_sessions
            WHERE protocol_id = $1 AND id = $2
            RETURNING id, date, network, variables
            "#,
        )
        .bind(protocol.as_str())
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let session = Self::parse_session_row(&row)?;

        let result = sqlx::query(
            r#"
            DELETE FROM resolver_resolutions
            WHERE protocol_id = $1 AND date >= $2
            "#,
        )
        .bind(protocol.as_str())
        .bind(session.date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(CascadeReport {
            session,
            resolutions_deleted: result.rows_affected() as usize,
        }))
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

#[async_trait]
impl ResolutionStore for PostgresStore {
    async fn list(&self, protocol: &ProtocolId) -> Result<Vec<Resolution>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, date, sequence, transforms, parameters
            FROM resolver_resolutions
            WHERE protocol_id = $1
            ORDER BY date, sequence, id
            "#,
        )
        .bind(protocol.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| Self::parse_resolution_row(r).map_err(StoreError::from))
            .collect()
    }

    async fn insert_resolution(
        &self,
        protocol: &ProtocolId,
        transforms: Vec<Transform>,
        options: ResolutionOptions,
    ) -> Result<Resolution, StoreError> {
        let id = ResolutionId::new(Uuid::new_v4().to_string());
        let date = options.date.unwrap_or_else(Utc::now);
        let parameters = (!options.parameters.is_null()).then(|| Json(&options.parameters));

        let row = sqlx::query(
            r#"
            INSERT INTO resolver_resolutions (protocol_id, id, date, transforms, parameters)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING sequence
            "#,
        )
        .bind(protocol.as_str())
        .bind(id.as_str())
        .bind(date)
        .bind(Json(&transforms))
        .bind(parameters)
        .fetch_one(&self.pool)
        .await?;

        let sequence: i64 = row.try_get("sequence")?;

        Ok(Resolution {
            id,
            date,
            sequence: sequence.max(0) as u64,
            transforms,
            parameters: options.parameters,
        })
    }

    async fn delete_since(&self, protocol: &ProtocolId, date: DateTime<Utc>) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM resolver_resolutions
            WHERE protocol_id = $1 AND date >= $2
            "#,
        )
        .bind(protocol.as_str())
        .bind(date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}
