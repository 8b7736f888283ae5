//! # Database Pool
//!
//! One SQLite file, one pool, migrations applied before the handle is
//! returned.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  LedgerConfig::db_config()                                              │
//! │       │  path, max_connections, acquire_timeout                         │
//! │       ▼                                                                 │
//! │  Database::new(config) ── WAL, foreign keys ── migrations               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SqlitePool ── engines open a transaction or borrow a connection       │
//! │       │        per call; repositories hold a clone of the pool          │
//! │       ▼                                                                 │
//! │  Database::close() on shutdown                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! WAL lets the back office read while the counter writes. The in-memory
//! database used by tests lives on exactly one connection, so a test must
//! drop a borrowed connection before the next pool call.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::credit::CreditPaymentRepository;
use crate::repository::distributor::DistributorRepository;
use crate::repository::movement::MovementRepository;
use crate::repository::product::ProductRepository;
use crate::repository::register::RegisterRepository;
use crate::repository::sale::SaleRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Pool settings.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/srv/tienda/tienda.db")
///     .max_connections(3)
///     .acquire_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, created on first connect.
    pub database_path: PathBuf,

    /// Default 5: the counter plus a few back-office readers.
    pub max_connections: u32,

    /// How long a call waits for a free connection before failing.
    /// Default 30 seconds.
    pub acquire_timeout: Duration,

    /// Idle connections are closed after this long.
    pub idle_timeout: Duration,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// A private database that disappears with the pool. Tests only.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            // Every connection would get its own empty database
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the store, cheap to clone.
///
/// Engines receive a `Database` at construction; nothing reaches the store
/// through a global.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./tienda.db")).await?;
/// let low = db.products().low_stock().await?;
///
/// // Multi-statement writes go through a transaction
/// let mut tx = db.pool().begin().await?;
/// tienda_db::repository::product::decrement_stock(&mut tx, &id, 2, now).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connects and applies pending migrations.
    ///
    /// Foreign keys are switched on for every connection: sale details,
    /// credit payments and distributor payments must point at real rows.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening database");

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());
        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            // May lose the last commit on power loss, never corrupts
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(
            max_connections = config.max_connections,
            acquire_timeout_secs = config.acquire_timeout.as_secs(),
            "Pool created"
        );

        migrations::run_migrations(&pool).await?;
        Ok(Database { pool })
    }

    /// The raw pool, for transactions spanning several repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    pub fn movements(&self) -> MovementRepository {
        MovementRepository::new(self.pool.clone())
    }

    pub fn credit_payments(&self) -> CreditPaymentRepository {
        CreditPaymentRepository::new(self.pool.clone())
    }

    pub fn registers(&self) -> RegisterRepository {
        RegisterRepository::new(self.pool.clone())
    }

    pub fn distributors(&self) -> DistributorRepository {
        DistributorRepository::new(self.pool.clone())
    }

    /// Waits for borrowed connections to come back, then closes them.
    /// Every later call on any clone of this handle fails.
    pub async fn close(&self) {
        info!("Closing database");
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_starts_empty() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert_eq!(db.products().count().await.unwrap(), 0);
        assert!(db.registers().get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_database_rejects_calls() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clone = db.clone();
        db.close().await;
        assert!(clone.products().count().await.is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/tienda.db")
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(3));
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(3));
        assert_eq!(DbConfig::in_memory().max_connections, 1);
    }
}
