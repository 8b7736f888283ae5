//! # tienda-core: Pure Business Logic for Tienda POS
//!
//! This crate holds the ledger rules as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tienda POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 tienda-ledger (engines)                         │   │
//! │  │   Sales ─ Stock ─ Credit ─ Register ─ Distributors              │   │
//! │  └──────────────┬───────────────────────────────┬──────────────────┘   │
//! │                 │                               │                       │
//! │  ┌──────────────▼──────────────────┐  ┌─────────▼──────────────────┐   │
//! │  │   ★ tienda-core (THIS CRATE) ★  │  │   tienda-db (SQLite)       │   │
//! │  │                                 │  │   repositories, migrations │   │
//! │  │  types   money   credit         │  └────────────────────────────┘   │
//! │  │  distributor  ticket validation │                                   │
//! │  │                                 │                                   │
//! │  │  NO I/O • NO CLOCK • PURE       │                                   │
//! │  └─────────────────────────────────┘                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Products, sales, credit terms, register, movements
//! - [`money`] - Money type with integer arithmetic
//! - [`credit`] - Interest accrual and credit state recompute
//! - [`distributor`] - Distributor ledgers, saldos, preregistros
//! - [`ticket`] - Ticket line variants
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tienda_core::money::Money;
//! use tienda_core::types::InterestRate;
//!
//! // 800.00 financed at 5% monthly, first month
//! let interest = Money::from_cents(80_000).apply_rate(InterestRate::from_bps(500), 1);
//! assert_eq!(interest.cents(), 4_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod credit;
pub mod distributor;
pub mod error;
pub mod money;
pub mod ticket;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in a single sale.
pub const MAX_SALE_ITEMS: usize = 100;

/// Maximum quantity of a single sale line.
///
/// ## Business Reason
/// Catches typos at the counter (1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Longest credit plan, in monthly installments.
pub const MAX_CREDIT_INSTALLMENTS: i64 = 120;

/// Highest unit price accepted, in cents (100,000,000.00).
///
/// Together with the quantity limits it keeps every line and sale total
/// far inside `i64`, so `Money` arithmetic on validated input cannot
/// overflow.
pub const MAX_PRICE_CENTS: i64 = 10_000_000_000;

/// Highest cash or payment amount accepted, in cents.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000_000;

/// Maximum units (sold plus top-up) on one distributor entry.
pub const MAX_DISTRIBUTOR_QUANTITY: i64 = 1_000_000;
