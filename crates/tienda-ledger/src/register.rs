//! # Cash Register Ledger
//!
//! One session per business date: `open → closed`, never reopened. While
//! open, `total_sales_cents` follows non-credit sales; it is the drawer
//! counter the close compares against.
//!
//! ```text
//! expected   = opening + total_sales
//! difference = counted − expected        (negative: drawer is short)
//! ```
//!
//! The counter is a shared row with last-write-wins semantics. That is
//! fine for one terminal per store; several terminals on one date would
//! need a session per terminal.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use tienda_core::validation::{validate_cash_amount, validate_reference};
use tienda_core::{CashRegister, Money, RegisterState};
use tienda_db::repository::register;
use tienda_db::{new_id, Database, DbError, PaymentMethodTotal};

use crate::clock::{minute_of, Clock};
use crate::error::{LedgerError, LedgerResult};

/// A session with its derived figures.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterSummary {
    pub register: CashRegister,
    pub expected_cash_cents: i64,
    /// Set once the register is closed.
    pub difference_cents: Option<i64>,
    /// Completed sales of the business date per payment method.
    pub sales_by_method: Vec<PaymentMethodTotal>,
}

#[derive(Debug, Clone)]
pub struct RegisterEngine {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl RegisterEngine {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        RegisterEngine { db, clock }
    }

    /// Opens today's register.
    ///
    /// ## Errors
    /// * `AlreadyOpen` - A register is open for today, whether found by the
    ///   pre-check or by the unique index when two callers race.
    pub async fn open(&self, opening_cents: i64, admin_id: &str) -> LedgerResult<CashRegister> {
        validate_cash_amount("opening amount", opening_cents)?;
        validate_reference("admin_id", admin_id)?;

        let now = self.clock.now();
        let today = now.date();

        let mut conn = self.db.pool().acquire().await?;
        if register::find_open(&mut conn, today).await?.is_some() {
            return Err(LedgerError::AlreadyOpen { date: today });
        }

        let session = CashRegister {
            id: new_id(),
            business_date: today,
            opened_at: minute_of(now),
            closed_at: None,
            opening_cents,
            total_sales_cents: 0,
            counted_cash_cents: None,
            difference_cents: None,
            admin_id: admin_id.to_string(),
            note: None,
            state: RegisterState::Open,
        };
        register::insert(&mut conn, &session).await.map_err(|e| match e {
            DbError::UniqueViolation { .. } => LedgerError::AlreadyOpen { date: today },
            other => other.into(),
        })?;

        info!(id = %session.id, date = %today, opening = opening_cents, "Cash register opened");
        Ok(session)
    }

    /// Counts the drawer and closes the session.
    pub async fn close(&self, register_id: &str, counted_cents: i64, note: Option<String>) -> LedgerResult<CashRegister> {
        validate_cash_amount("counted cash", counted_cents)?;

        let mut conn = self.db.pool().acquire().await?;
        let mut session = register::get(&mut conn, register_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Cash register", register_id))?;
        if !session.is_open() {
            return Err(LedgerError::NotOpen {
                id: register_id.to_string(),
            });
        }

        session.close(Money::from_cents(counted_cents), self.clock.time(), note)?;
        if !register::store_close(&mut conn, &session).await? {
            return Err(LedgerError::NotOpen {
                id: register_id.to_string(),
            });
        }

        info!(
            id = %session.id,
            expected = %session.expected_cash(),
            counted = counted_cents,
            difference = ?session.difference_cents,
            "Cash register closed"
        );
        Ok(session)
    }

    /// The open register of a date, if any.
    pub async fn current(&self, date: NaiveDate) -> LedgerResult<Option<CashRegister>> {
        Ok(self.db.registers().find_open(date).await?)
    }

    pub async fn get(&self, register_id: &str) -> LedgerResult<CashRegister> {
        self.db
            .registers()
            .get(register_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Cash register", register_id))
    }

    /// Every session of a date, open or closed.
    pub async fn history(&self, date: NaiveDate) -> LedgerResult<Vec<CashRegister>> {
        Ok(self.db.registers().list_by_date(date).await?)
    }

    pub async fn summary(&self, register_id: &str) -> LedgerResult<RegisterSummary> {
        let session = self.get(register_id).await?;
        let sales_by_method = self.db.sales().daily_totals(session.business_date).await?;
        Ok(RegisterSummary {
            expected_cash_cents: session.expected_cash().cents(),
            difference_cents: session.difference_cents,
            register: session,
            sales_by_method,
        })
    }

    /// Adds a sale total to the open register of `date`.
    ///
    /// Returns `false` when no register is open; nothing is written then.
    pub async fn apply_sale(&self, date: NaiveDate, amount_cents: i64) -> LedgerResult<bool> {
        let mut conn = self.db.pool().acquire().await?;
        let applied = register::add_sales(&mut conn, date, amount_cents).await?;
        if !applied {
            debug!(date = %date, amount = amount_cents, "No open register; sale total not applied");
        }
        Ok(applied)
    }

    /// Takes a sale total back off the open register of `date`, stopping
    /// at zero.
    pub async fn revert_sale(&self, date: NaiveDate, amount_cents: i64) -> LedgerResult<bool> {
        let mut conn = self.db.pool().acquire().await?;
        let reverted = register::subtract_sales(&mut conn, date, amount_cents).await?;
        if !reverted {
            debug!(date = %date, amount = amount_cents, "No open register; sale total not reverted");
        }
        Ok(reverted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ErrorKind;
    use tienda_db::DbConfig;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    async fn setup() -> (RegisterEngine, Arc<FixedClock>) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(FixedClock::at(day().and_hms_opt(8, 30, 0).unwrap()));
        (RegisterEngine::new(db, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_open_twice_same_day() {
        let (engine, _clock) = setup().await;
        let session = engine.open(10_000, "admin").await.unwrap();
        assert!(session.is_open());
        assert_eq!(session.business_date, day());

        let err = engine.open(5_000, "admin").await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyOpen { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_close_computes_difference() {
        let (engine, clock) = setup().await;
        let session = engine.open(10_000, "admin").await.unwrap();
        assert!(engine.apply_sale(day(), 4_500).await.unwrap());

        clock.set(day().and_hms_opt(21, 0, 0).unwrap());
        let closed = engine
            .close(&session.id, 14_000, Some("faltan 5".into()))
            .await
            .unwrap();
        assert_eq!(closed.state, RegisterState::Closed);
        assert_eq!(closed.counted_cash_cents, Some(14_000));
        assert_eq!(closed.difference_cents, Some(-500));

        let summary = engine.summary(&session.id).await.unwrap();
        assert_eq!(summary.expected_cash_cents, 14_500);
        assert_eq!(summary.difference_cents, Some(-500));
        assert_eq!(summary.register.closed_at.unwrap().to_string(), "21:00:00");
    }

    #[tokio::test]
    async fn test_session_times_read_back_as_returned() {
        let (engine, clock) = setup().await;
        clock.set(day().and_hms_opt(8, 30, 42).unwrap());
        let session = engine.open(0, "admin").await.unwrap();
        assert_eq!(engine.get(&session.id).await.unwrap().opened_at, session.opened_at);

        clock.set(day().and_hms_opt(20, 59, 59).unwrap());
        let closed = engine.close(&session.id, 0, None).await.unwrap();
        assert_eq!(closed.closed_at.unwrap().to_string(), "20:59:00");
        assert_eq!(engine.get(&session.id).await.unwrap().closed_at, closed.closed_at);
    }

    #[tokio::test]
    async fn test_close_twice_is_not_open() {
        let (engine, _clock) = setup().await;
        let session = engine.open(0, "admin").await.unwrap();
        engine.close(&session.id, 0, None).await.unwrap();

        let err = engine.close(&session.id, 0, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotOpen { .. }));

        let err = engine.close("missing", 0, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_new_session_after_close() {
        let (engine, _clock) = setup().await;
        let first = engine.open(1_000, "admin").await.unwrap();
        engine.close(&first.id, 1_000, None).await.unwrap();

        let second = engine.open(2_000, "admin").await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(engine.current(day()).await.unwrap().unwrap().id, second.id);
        assert_eq!(engine.history(day()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_revert_floors_at_zero() {
        let (engine, _clock) = setup().await;
        let session = engine.open(1_000, "admin").await.unwrap();
        engine.apply_sale(day(), 300).await.unwrap();
        engine.revert_sale(day(), 800).await.unwrap();
        assert_eq!(engine.get(&session.id).await.unwrap().total_sales_cents, 0);

        // No register on another date
        let other = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(!engine.apply_sale(other, 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_negative_amounts_rejected() {
        let (engine, _clock) = setup().await;
        let err = engine.open(-1, "admin").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
