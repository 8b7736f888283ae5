//! # Ledger Error Type
//!
//! The one error type every engine returns.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tienda POS                             │
//! │                                                                         │
//! │  ValidationError ──► CoreError ──┐                                      │
//! │                                  ├──► LedgerError ──► kind()  (taxonomy)│
//! │  sqlx::Error ─────► DbError ─────┘         │                            │
//! │                                            ├──► code()  ("NOT_OPEN")    │
//! │  engine failures (NotOpen, DetailInsert-   └──► Display (one sentence)  │
//! │  Failed, ...) are raised directly                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A caller that wants a serializable form uses [`LedgerError::report`]:
//! ```json
//! { "kind": "CONFLICT", "code": "ALREADY_OPEN", "message": "A cash register is already open for 2026-03-01" }
//! ```

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use tienda_core::{CoreError, ValidationError};
use tienda_db::DbError;

/// Result type alias for engine operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failure classes shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Bad input: missing credit fields, invalid quantity or price.
    Validation,
    NotFound,
    /// Duplicate name, already-open register, already-voided sale.
    Conflict,
    InsufficientStock,
    /// Cancellation outside the allowed window.
    StaleOperation,
    /// The store failed underneath the engine.
    DependencyFailure,
}

/// Errors returned by the ledger engines.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A register is already open for the business date.
    #[error("A cash register is already open for {date}")]
    AlreadyOpen { date: NaiveDate },

    /// Closing a register that is not open.
    #[error("Cash register {id} is not open")]
    NotOpen { id: String },

    /// The distributor already has an open reconciliation.
    #[error("Distributor {distributor_id} already has an open reconciliation")]
    ReconciliationOpen { distributor_id: String },

    /// Line items could not be written; the sale was rolled back.
    #[error("Sale details could not be saved: {0}")]
    DetailInsertFailed(#[source] DbError),

    /// The ledger row for a stock change could not be written; the stock
    /// change was rolled back with it.
    #[error("Inventory movement for product {product_id} could not be saved: {source}")]
    MovementInsertFailed {
        product_id: String,
        #[source]
        source: DbError,
    },

    #[error(transparent)]
    Domain(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] DbError),
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Domain(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Store(DbError::from(err))
    }
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::AlreadyOpen { .. }
            | LedgerError::NotOpen { .. }
            | LedgerError::ReconciliationOpen { .. } => ErrorKind::Conflict,
            LedgerError::DetailInsertFailed(_) | LedgerError::MovementInsertFailed { .. } => {
                ErrorKind::DependencyFailure
            }
            LedgerError::Domain(err) => match err {
                CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
                CoreError::AlreadyVoided(_) | CoreError::InvalidTransition { .. } => ErrorKind::Conflict,
                CoreError::StaleCancellation { .. } => ErrorKind::StaleOperation,
                CoreError::NotCreditSale(_)
                | CoreError::PaymentExceedsBalance { .. }
                | CoreError::Validation(_) => ErrorKind::Validation,
            },
            LedgerError::Store(err) => match err {
                DbError::NotFound { .. } => ErrorKind::NotFound,
                DbError::UniqueViolation { .. } => ErrorKind::Conflict,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => ErrorKind::Validation,
                _ => ErrorKind::DependencyFailure,
            },
        }
    }

    /// Machine-readable code, SCREAMING_SNAKE_CASE.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::AlreadyOpen { .. } => "ALREADY_OPEN",
            LedgerError::NotOpen { .. } => "NOT_OPEN",
            LedgerError::ReconciliationOpen { .. } => "RECONCILIATION_OPEN",
            LedgerError::DetailInsertFailed(_) => "DETAIL_INSERT_FAILED",
            LedgerError::MovementInsertFailed { .. } => "MOVEMENT_INSERT_FAILED",
            LedgerError::Domain(err) => match err {
                CoreError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
                CoreError::AlreadyVoided(_) => "ALREADY_VOIDED",
                CoreError::StaleCancellation { .. } => "STALE_CANCELLATION",
                CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
                CoreError::NotCreditSale(_) => "NOT_CREDIT_SALE",
                CoreError::PaymentExceedsBalance { .. } => "PAYMENT_EXCEEDS_BALANCE",
                CoreError::Validation(_) => "VALIDATION_ERROR",
            },
            LedgerError::Store(err) => match err {
                DbError::NotFound { .. } => "NOT_FOUND",
                DbError::UniqueViolation { .. } => "DUPLICATE",
                DbError::ForeignKeyViolation { .. } => "INVALID_REFERENCE",
                DbError::CheckViolation { .. } => "CONSTRAINT_VIOLATION",
                _ => "DATABASE_ERROR",
            },
        }
    }

    /// Serializable form for the UI layer.
    ///
    /// Store failures are logged in full here and reported with a generic
    /// message; the raw SQLite text is not meant for display.
    pub fn report(&self) -> ErrorReport {
        let message = match self {
            LedgerError::Store(err) if self.kind() == ErrorKind::DependencyFailure => {
                error!(error = %err, "Database operation failed");
                "Database operation failed".to_string()
            }
            other => other.to_string(),
        };
        ErrorReport {
            kind: self.kind(),
            code: self.code(),
            message,
        }
    }
}

/// What a caller displays: classification plus one message.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
}
