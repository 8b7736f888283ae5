//! # Error Types
//!
//! Domain-specific error types for tienda-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tienda-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tienda-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  tienda-ledger errors                                                  │
//! │  └── LedgerError      - What callers see (kind + code + message)       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product, sale, dates)
//! 3. Errors are enum variants, never String
//! 4. Every variant renders as one complete sentence for display

use chrono::NaiveDate;
use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. They are raised before
/// any write happens, so a caller receiving one can assume nothing changed.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Insufficient stock to complete a sale.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale request (qty: 5)
    ///      │
    ///      ▼
    /// Check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 3, requested: 5 }
    /// ```
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// The sale was already cancelled; voided is terminal.
    #[error("Sale {0} is already voided")]
    AlreadyVoided(String),

    /// Cancellation is only allowed on the day the sale was made.
    #[error("Sale {sale_id} from {sale_date} can only be cancelled on the same day (today is {today})")]
    StaleCancellation {
        sale_id: String,
        sale_date: NaiveDate,
        today: NaiveDate,
    },

    /// A lifecycle transition that the state machine does not allow.
    #[error("{entity} {id} cannot go from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// Credit operation attempted on a sale paid another way.
    #[error("Sale {0} is not a credit sale")]
    NotCreditSale(String),

    /// Payment would take the credit balance below zero.
    #[error("Payment of {amount} exceeds the pending balance of {pending} on sale {sale_id}")]
    PaymentExceedsBalance {
        sale_id: String,
        amount: Money,
        pending: Money,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Field is not allowed in this context.
    #[error("{field} is not allowed: {reason}")]
    NotAllowed { field: String, reason: String },

    /// Duplicate value inside one request (e.g. a product listed twice).
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            available: 0,
            requested: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-1: available 0, requested 1"
        );

        let err = CoreError::StaleCancellation {
            sale_id: "s-1".to_string(),
            sale_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            today: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "Sale s-1 from 2026-03-01 can only be cancelled on the same day (today is 2026-03-02)"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "client_id".to_string(),
        };
        assert_eq!(err.to_string(), "client_id is required");

        let err = ValidationError::OutOfRange {
            field: "installments".to_string(),
            min: 1,
            max: 120,
        };
        assert_eq!(err.to_string(), "installments must be between 1 and 120");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "seller_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
