//! # Database Migrations
//!
//! The SQL files under `migrations/sqlite/` are embedded at compile time
//! and applied by [`Database::new`](crate::Database::new) before any
//! repository is handed out.
//!
//! ```text
//! migrations/sqlite/
//! ├── 001_initial_schema.sql  # Products, sales, credit, registers, movements
//! └── 002_distributors.sql    # Distributor ledgers, payments, notices
//! ```
//!
//! ## Adding a Migration
//!
//! 1. Add `NNN_description.sql` with the next sequence number
//! 2. Use `IF NOT EXISTS` where SQLite allows it
//! 3. **NEVER** edit a migration that has shipped; sqlx checks checksums
//!    recorded in `_sqlx_migrations` and refuses to start on a mismatch

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies pending migrations in filename order, each in its own
/// transaction. Already applied ones are skipped.
pub(crate) async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(migrations = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}
