//! # Register Repository
//!
//! Cash register sessions (arqueo de caja).
//!
//! ## Session Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open(date)  ──►  [open]  ──► close  ──►  [closed]                     │
//! │                     ▲                                                   │
//! │    add_sales / subtract_sales mutate total_sales_cents while open      │
//! │                                                                         │
//! │  idx_cash_registers_one_open: a second open row for the same date      │
//! │  fails with UniqueViolation even if two callers race the pre-check.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{format_time, parse_optional_time, parse_time};
use tienda_core::{CashRegister, RegisterState};

const REGISTER_COLUMNS: &str = "id, business_date, opened_at, closed_at, opening_cents, \
     total_sales_cents, counted_cash_cents, difference_cents, admin_id, note, state";

#[derive(Debug, sqlx::FromRow)]
struct RegisterRow {
    id: String,
    business_date: NaiveDate,
    opened_at: String,
    closed_at: Option<String>,
    opening_cents: i64,
    total_sales_cents: i64,
    counted_cash_cents: Option<i64>,
    difference_cents: Option<i64>,
    admin_id: String,
    note: Option<String>,
    state: RegisterState,
}

impl TryFrom<RegisterRow> for CashRegister {
    type Error = DbError;

    fn try_from(row: RegisterRow) -> DbResult<Self> {
        Ok(CashRegister {
            opened_at: parse_time("opened_at", &row.opened_at)?,
            closed_at: parse_optional_time("closed_at", row.closed_at.as_deref())?,
            id: row.id,
            business_date: row.business_date,
            opening_cents: row.opening_cents,
            total_sales_cents: row.total_sales_cents,
            counted_cash_cents: row.counted_cash_cents,
            difference_cents: row.difference_cents,
            admin_id: row.admin_id,
            note: row.note,
            state: row.state,
        })
    }
}

pub async fn insert(conn: &mut SqliteConnection, register: &CashRegister) -> DbResult<()> {
    debug!(
        id = %register.id,
        date = %register.business_date,
        opening = register.opening_cents,
        "Opening cash register"
    );

    sqlx::query(
        r#"
        INSERT INTO cash_registers (
            id, business_date, opened_at, opening_cents, total_sales_cents, admin_id, state
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&register.id)
    .bind(register.business_date)
    .bind(format_time(register.opened_at))
    .bind(register.opening_cents)
    .bind(register.total_sales_cents)
    .bind(&register.admin_id)
    .bind(register.state)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<CashRegister>> {
    let sql = format!("SELECT {REGISTER_COLUMNS} FROM cash_registers WHERE id = ?1");
    let row = sqlx::query_as::<_, RegisterRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(CashRegister::try_from).transpose()
}

/// The open register for a date, if any.
pub async fn find_open(conn: &mut SqliteConnection, date: NaiveDate) -> DbResult<Option<CashRegister>> {
    let sql = format!(
        "SELECT {REGISTER_COLUMNS} FROM cash_registers WHERE business_date = ?1 AND state = 'open'"
    );
    let row = sqlx::query_as::<_, RegisterRow>(&sql)
        .bind(date)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(CashRegister::try_from).transpose()
}

/// Persists a register that has gone through [`CashRegister::close`].
///
/// Only an open row is updated; returns `false` if it was already closed.
pub async fn store_close(conn: &mut SqliteConnection, register: &CashRegister) -> DbResult<bool> {
    debug!(
        id = %register.id,
        counted = ?register.counted_cash_cents,
        difference = ?register.difference_cents,
        "Closing cash register"
    );

    let result = sqlx::query(
        r#"
        UPDATE cash_registers
        SET closed_at = ?1, counted_cash_cents = ?2, difference_cents = ?3, note = ?4, state = 'closed'
        WHERE id = ?5 AND state = 'open'
        "#,
    )
    .bind(register.closed_at.map(format_time))
    .bind(register.counted_cash_cents)
    .bind(register.difference_cents)
    .bind(&register.note)
    .bind(&register.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Adds to the open register of `date`.
///
/// ## Returns
/// `false` when no register is open for that date; nothing is written.
pub async fn add_sales(conn: &mut SqliteConnection, date: NaiveDate, amount_cents: i64) -> DbResult<bool> {
    debug!(date = %date, amount = amount_cents, "Adding to register sales total");

    let result = sqlx::query(
        r#"
        UPDATE cash_registers
        SET total_sales_cents = total_sales_cents + ?1
        WHERE business_date = ?2 AND state = 'open'
        "#,
    )
    .bind(amount_cents)
    .bind(date)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Subtracts from the open register of `date`, never going below zero.
pub async fn subtract_sales(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    amount_cents: i64,
) -> DbResult<bool> {
    debug!(date = %date, amount = amount_cents, "Subtracting from register sales total");

    let result = sqlx::query(
        r#"
        UPDATE cash_registers
        SET total_sales_cents = MAX(total_sales_cents - ?1, 0)
        WHERE business_date = ?2 AND state = 'open'
        "#,
    )
    .bind(amount_cents)
    .bind(date)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Repository for cash register sessions.
#[derive(Debug, Clone)]
pub struct RegisterRepository {
    pool: SqlitePool,
}

impl RegisterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RegisterRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<CashRegister>> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, id).await
    }

    pub async fn find_open(&self, date: NaiveDate) -> DbResult<Option<CashRegister>> {
        let mut conn = self.pool.acquire().await?;
        find_open(&mut conn, date).await
    }

    /// All sessions of a date, open or closed, in opening order.
    pub async fn list_by_date(&self, date: NaiveDate) -> DbResult<Vec<CashRegister>> {
        let sql = format!(
            "SELECT {REGISTER_COLUMNS} FROM cash_registers WHERE business_date = ?1 ORDER BY opened_at, rowid"
        );
        let rows = sqlx::query_as::<_, RegisterRow>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CashRegister::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::new_id;
    use chrono::NaiveTime;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn register() -> CashRegister {
        CashRegister {
            id: new_id(),
            business_date: day(),
            opened_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            closed_at: None,
            opening_cents: 5_000,
            total_sales_cents: 0,
            counted_cash_cents: None,
            difference_cents: None,
            admin_id: "admin".to_string(),
            note: None,
            state: RegisterState::Open,
        }
    }

    #[tokio::test]
    async fn test_second_open_register_same_day_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        insert(&mut conn, &register()).await.unwrap();

        let err = insert(&mut conn, &register()).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_subtract_floors_at_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let reg = register();
        insert(&mut conn, &reg).await.unwrap();

        assert!(add_sales(&mut conn, day(), 3_000).await.unwrap());
        assert!(subtract_sales(&mut conn, day(), 10_000).await.unwrap());
        let loaded = get(&mut conn, &reg.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_sales_cents, 0);

        let other_day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(!add_sales(&mut conn, other_day, 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_register_frees_the_date() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let mut reg = register();
        insert(&mut conn, &reg).await.unwrap();

        reg.close(
            tienda_core::Money::from_cents(5_000),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            None,
        )
        .unwrap();
        assert!(store_close(&mut conn, &reg).await.unwrap());
        assert!(!store_close(&mut conn, &reg).await.unwrap());
        assert!(find_open(&mut conn, day()).await.unwrap().is_none());

        insert(&mut conn, &register()).await.unwrap();
    }
}
