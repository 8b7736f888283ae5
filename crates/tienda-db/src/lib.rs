//! # tienda-db: Database Layer for Tienda POS
//!
//! SQLite persistence for the ledger engines, built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tienda POS Data Flow                             │
//! │                                                                         │
//! │  tienda-ledger engine (SaleEngine::create)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tienda-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ product       │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ movement      │    │ 001_initial  │  │   │
//! │  │   │ Transactions  │    │ sale, credit  │    │ 002_distrib. │  │   │
//! │  │   │               │    │ register      │    │              │  │   │
//! │  │   │               │    │ distributor   │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (tienda.db)                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - `migrations` - Embedded schema, applied on connect
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations and per-statement functions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tienda_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/tienda.db")).await?;
//! let low = db.products().low_stock().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::new_id;

// Repository re-exports for convenience
pub use repository::credit::CreditPaymentRepository;
pub use repository::distributor::DistributorRepository;
pub use repository::movement::MovementRepository;
pub use repository::product::ProductRepository;
pub use repository::register::RegisterRepository;
pub use repository::sale::{PaymentMethodTotal, SaleRepository};
