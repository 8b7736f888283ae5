//! # Credit Payment Repository
//!
//! Payments recorded against credit sales. The down payment is not a row
//! here; it lives on the sale's credit terms.

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tienda_core::CreditPayment;

const PAYMENT_COLUMNS: &str = "id, sale_id, amount_cents, payment_date, payment_method, \
     installment_number, note, created_at";

pub async fn insert(conn: &mut SqliteConnection, payment: &CreditPayment) -> DbResult<()> {
    debug!(
        id = %payment.id,
        sale_id = %payment.sale_id,
        amount = payment.amount_cents,
        "Recording credit payment"
    );

    sqlx::query(
        r#"
        INSERT INTO credit_payments (
            id, sale_id, amount_cents, payment_date, payment_method,
            installment_number, note, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.sale_id)
    .bind(payment.amount_cents)
    .bind(payment.payment_date)
    .bind(payment.payment_method)
    .bind(payment.installment_number)
    .bind(&payment.note)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Payments of one sale, oldest first.
pub async fn list_for_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<CreditPayment>> {
    let sql = format!(
        "SELECT {PAYMENT_COLUMNS} FROM credit_payments \
         WHERE sale_id = ?1 ORDER BY payment_date, created_at, rowid"
    );
    let payments = sqlx::query_as::<_, CreditPayment>(&sql)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(payments)
}

/// Repository for credit payments.
#[derive(Debug, Clone)]
pub struct CreditPaymentRepository {
    pool: SqlitePool,
}

impl CreditPaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CreditPaymentRepository { pool }
    }

    pub async fn list_for_sale(&self, sale_id: &str) -> DbResult<Vec<CreditPayment>> {
        let mut conn = self.pool.acquire().await?;
        list_for_sale(&mut conn, sale_id).await
    }

    /// Sum collected on a day across all credit sales.
    pub async fn collected_on(&self, date: NaiveDate) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM credit_payments WHERE payment_date = ?1",
        )
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }
}
