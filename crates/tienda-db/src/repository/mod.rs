//! # Repository Module
//!
//! Database repository implementations for Tienda POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Single statement             Multi-step (engine owns the transaction) │
//! │  db.products().get(id)        let mut tx = db.pool().begin().await?;   │
//! │       │                       product::decrement_stock(&mut tx, ..)    │
//! │       │                       movement::insert(&mut tx, ..)            │
//! │       │                       tx.commit().await?;                      │
//! │       ▼                              │                                  │
//! │  Repository (holds the pool)         ▼                                  │
//! │       └──────────► free fns taking &mut SqliteConnection               │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                         SQLite Database                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repository methods acquire a connection and call the free functions, so
//! the SQL for each statement lives in exactly one place.
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalogue and stock cache
//! - [`movement::MovementRepository`] - Inventory ledger
//! - [`sale::SaleRepository`] - Sales and details
//! - [`credit::CreditPaymentRepository`] - Credit payments
//! - [`register::RegisterRepository`] - Cash register sessions
//! - [`distributor::DistributorRepository`] - Distributor ledgers

use chrono::NaiveTime;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

pub mod credit;
pub mod distributor;
pub mod movement;
pub mod product;
pub mod register;
pub mod sale;

/// Generates a new entity ID (UUID v4).
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Times are stored as `HH:MM`, exactly as captured.
pub(crate) fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub(crate) fn parse_time(column: &'static str, raw: &str) -> DbResult<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M").map_err(|e| DbError::Decode {
        column,
        reason: format!("{raw}: {e}"),
    })
}

pub(crate) fn parse_optional_time(column: &'static str, raw: Option<&str>) -> DbResult<Option<NaiveTime>> {
    raw.map(|value| parse_time(column, value)).transpose()
}
