//! # Sale Repository
//!
//! Database operations for sales and their line items.
//!
//! ## Row Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sales row (flat)                      Sale (domain)                    │
//! │  ─────────────────                     ─────────────                    │
//! │  id, date, time, total, method ...  →  Sale { .., credit: None }        │
//! │  + installments, due_date, rate,    →  Sale { .., credit: Some(terms) } │
//! │    down_payment, projection ...                                         │
//! │                                                                         │
//! │  The table's CHECK makes the credit columns all-or-nothing, so a       │
//! │  cash sale row never decodes with credit terms.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{format_time, parse_time};
use tienda_core::{
    CreditState, CreditTerms, InterestRate, PaymentMethod, Sale, SaleDetail, SaleState,
    SaleWithDetails,
};

const SALE_COLUMNS: &str = "id, sale_date, sale_time, total_cents, payment_method, client_id, \
     seller_id, state, installments, due_date, monthly_rate_bps, down_payment_cents, \
     interest_waived, amount_paid_cents, pending_balance_cents, accrued_interest_cents, \
     total_with_interest_cents, credit_state, cancelled_by, cancellation_reason";

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    sale_date: NaiveDate,
    sale_time: String,
    total_cents: i64,
    payment_method: PaymentMethod,
    client_id: Option<String>,
    seller_id: String,
    state: SaleState,
    installments: Option<i64>,
    due_date: Option<NaiveDate>,
    monthly_rate_bps: Option<i64>,
    down_payment_cents: Option<i64>,
    interest_waived: Option<bool>,
    amount_paid_cents: Option<i64>,
    pending_balance_cents: Option<i64>,
    accrued_interest_cents: Option<i64>,
    total_with_interest_cents: Option<i64>,
    credit_state: Option<CreditState>,
    cancelled_by: Option<String>,
    cancellation_reason: Option<String>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = DbError;

    fn try_from(row: SaleRow) -> DbResult<Self> {
        let credit = if row.payment_method.is_credit() {
            match (
                row.installments,
                row.due_date,
                row.monthly_rate_bps,
                row.down_payment_cents,
                row.interest_waived,
            ) {
                (Some(installments), Some(due_date), Some(rate), Some(down), Some(waived)) => {
                    Some(CreditTerms {
                        installments: u32::try_from(installments).map_err(|e| DbError::Decode {
                            column: "installments",
                            reason: e.to_string(),
                        })?,
                        due_date,
                        monthly_rate: InterestRate::from_bps(u32::try_from(rate).map_err(|e| {
                            DbError::Decode {
                                column: "monthly_rate_bps",
                                reason: e.to_string(),
                            }
                        })?),
                        down_payment_cents: down,
                        interest_waived: waived,
                        amount_paid_cents: row.amount_paid_cents.unwrap_or(down),
                        pending_balance_cents: row.pending_balance_cents.unwrap_or(0),
                        accrued_interest_cents: row.accrued_interest_cents.unwrap_or(0),
                        total_with_interest_cents: row.total_with_interest_cents.unwrap_or(0),
                        state: row.credit_state.unwrap_or(CreditState::Pending),
                    })
                }
                _ => {
                    return Err(DbError::Decode {
                        column: "installments",
                        reason: format!("credit sale {} is missing its terms", row.id),
                    })
                }
            }
        } else {
            None
        };

        Ok(Sale {
            sale_time: parse_time("sale_time", &row.sale_time)?,
            id: row.id,
            sale_date: row.sale_date,
            total_cents: row.total_cents,
            payment_method: row.payment_method,
            client_id: row.client_id,
            seller_id: row.seller_id,
            state: row.state,
            credit,
            cancelled_by: row.cancelled_by,
            cancellation_reason: row.cancellation_reason,
        })
    }
}

/// Completed-sale totals for one payment method on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentMethodTotal {
    pub payment_method: PaymentMethod,
    pub sales: i64,
    pub total_cents: i64,
}

// =============================================================================
// Connection-level statements
// =============================================================================

pub async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale, created_at: NaiveDateTime) -> DbResult<()> {
    debug!(id = %sale.id, total = sale.total_cents, method = ?sale.payment_method, "Inserting sale");

    let credit = sale.credit.as_ref();
    sqlx::query(
        r#"
        INSERT INTO sales (
            id, sale_date, sale_time, total_cents, payment_method, client_id, seller_id, state,
            installments, due_date, monthly_rate_bps, down_payment_cents, interest_waived,
            amount_paid_cents, pending_balance_cents, accrued_interest_cents,
            total_with_interest_cents, credit_state, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12, ?13,
            ?14, ?15, ?16,
            ?17, ?18, ?19
        )
        "#,
    )
    .bind(&sale.id)
    .bind(sale.sale_date)
    .bind(format_time(sale.sale_time))
    .bind(sale.total_cents)
    .bind(sale.payment_method)
    .bind(&sale.client_id)
    .bind(&sale.seller_id)
    .bind(sale.state)
    .bind(credit.map(|c| i64::from(c.installments)))
    .bind(credit.map(|c| c.due_date))
    .bind(credit.map(|c| i64::from(c.monthly_rate.bps())))
    .bind(credit.map(|c| c.down_payment_cents))
    .bind(credit.map(|c| c.interest_waived))
    .bind(credit.map(|c| c.amount_paid_cents))
    .bind(credit.map(|c| c.pending_balance_cents))
    .bind(credit.map(|c| c.accrued_interest_cents))
    .bind(credit.map(|c| c.total_with_interest_cents))
    .bind(credit.map(|c| c.state))
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts all line items with a single statement.
pub async fn insert_details(conn: &mut SqliteConnection, details: &[SaleDetail]) -> DbResult<()> {
    if details.is_empty() {
        return Ok(());
    }
    debug!(sale_id = %details[0].sale_id, count = details.len(), "Inserting sale details");

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO sale_details (id, sale_id, product_id, quantity, unit_price_cents, subtotal_cents) ",
    );
    builder.push_values(details, |mut row, detail| {
        row.push_bind(&detail.id)
            .push_bind(&detail.sale_id)
            .push_bind(&detail.product_id)
            .push_bind(detail.quantity)
            .push_bind(detail.unit_price_cents)
            .push_bind(detail.subtotal_cents);
    });
    builder.build().execute(&mut *conn).await?;

    Ok(())
}

pub async fn get(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
    let row = sqlx::query_as::<_, SaleRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Sale::try_from).transpose()
}

pub async fn details(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleDetail>> {
    let details = sqlx::query_as::<_, SaleDetail>(
        r#"
        SELECT id, sale_id, product_id, quantity, unit_price_cents, subtotal_cents
        FROM sale_details
        WHERE sale_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(details)
}

/// Flips a completed sale to voided.
///
/// ## Returns
/// `false` if the sale was not in `completed` (already voided by someone else).
pub async fn mark_voided(
    conn: &mut SqliteConnection,
    id: &str,
    cancelled_by: &str,
    reason: &str,
) -> DbResult<bool> {
    debug!(id = %id, cancelled_by = %cancelled_by, "Voiding sale");

    let result = sqlx::query(
        r#"
        UPDATE sales
        SET state = 'voided', cancelled_by = ?1, cancellation_reason = ?2
        WHERE id = ?3 AND state = 'completed'
        "#,
    )
    .bind(cancelled_by)
    .bind(reason)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Stores a refreshed credit projection.
pub async fn update_credit_projection(
    conn: &mut SqliteConnection,
    id: &str,
    terms: &CreditTerms,
) -> DbResult<()> {
    debug!(id = %id, state = ?terms.state, pending = terms.pending_balance_cents, "Updating credit projection");

    let result = sqlx::query(
        r#"
        UPDATE sales
        SET amount_paid_cents = ?1,
            pending_balance_cents = ?2,
            accrued_interest_cents = ?3,
            total_with_interest_cents = ?4,
            credit_state = ?5,
            interest_waived = ?6
        WHERE id = ?7 AND payment_method = 'credit'
        "#,
    )
    .bind(terms.amount_paid_cents)
    .bind(terms.pending_balance_cents)
    .bind(terms.accrued_interest_cents)
    .bind(terms.total_with_interest_cents)
    .bind(terms.state)
    .bind(terms.interest_waived)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Credit sale", id));
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, id).await
    }

    /// Gets all line items for a sale.
    pub async fn details(&self, sale_id: &str) -> DbResult<Vec<SaleDetail>> {
        let mut conn = self.pool.acquire().await?;
        details(&mut conn, sale_id).await
    }

    pub async fn get_with_details(&self, id: &str) -> DbResult<Option<SaleWithDetails>> {
        let mut conn = self.pool.acquire().await?;
        let Some(sale) = get(&mut conn, id).await? else {
            return Ok(None);
        };
        let details = details(&mut conn, id).await?;
        Ok(Some(SaleWithDetails { sale, details }))
    }

    /// Sales of one day, voided included, in time order.
    pub async fn list_by_date(&self, date: NaiveDate) -> DbResult<Vec<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE sale_date = ?1 ORDER BY sale_time, rowid");
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Sale::try_from).collect()
    }

    /// Completed credit sales, oldest first.
    pub async fn list_open_credit(&self) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE payment_method = 'credit' AND state = 'completed' \
             ORDER BY sale_date, sale_time"
        );
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Sale::try_from).collect()
    }

    /// Per-method totals of completed sales for a day. Voided sales excluded.
    pub async fn daily_totals(&self, date: NaiveDate) -> DbResult<Vec<PaymentMethodTotal>> {
        let totals = sqlx::query_as::<_, PaymentMethodTotal>(
            r#"
            SELECT payment_method, COUNT(*) AS sales, COALESCE(SUM(total_cents), 0) AS total_cents
            FROM sales
            WHERE sale_date = ?1 AND state = 'completed'
            GROUP BY payment_method
            ORDER BY payment_method
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(totals)
    }

    pub async fn update_credit_projection(&self, id: &str, terms: &CreditTerms) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        update_credit_projection(&mut conn, id, terms).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::new_id;
    use chrono::NaiveTime;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn sale(method: PaymentMethod, credit: Option<CreditTerms>) -> Sale {
        Sale {
            id: new_id(),
            sale_date: day(),
            sale_time: NaiveTime::from_hms_opt(10, 45, 0).unwrap(),
            total_cents: 100_000,
            payment_method: method,
            client_id: credit.as_ref().map(|_| "client-1".to_string()),
            seller_id: "seller".to_string(),
            state: SaleState::Completed,
            credit,
            cancelled_by: None,
            cancellation_reason: None,
        }
    }

    fn terms() -> CreditTerms {
        CreditTerms {
            installments: 3,
            due_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            monthly_rate: InterestRate::from_bps(500),
            down_payment_cents: 20_000,
            interest_waived: false,
            amount_paid_cents: 20_000,
            pending_balance_cents: 92_000,
            accrued_interest_cents: 4_000,
            total_with_interest_cents: 112_000,
            state: CreditState::Partial,
        }
    }

    fn created() -> NaiveDateTime {
        day().and_hms_opt(10, 45, 0).unwrap()
    }

    #[tokio::test]
    async fn test_credit_sale_round_trips_terms() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = sale(PaymentMethod::Credit, Some(terms()));
        let mut conn = db.pool().acquire().await.unwrap();
        insert_sale(&mut conn, &s, created()).await.unwrap();
        drop(conn);

        let loaded = db.sales().get(&s.id).await.unwrap().unwrap();
        assert_eq!(loaded.credit, Some(terms()));
        assert_eq!(loaded.sale_time, NaiveTime::from_hms_opt(10, 45, 0).unwrap());
    }

    #[tokio::test]
    async fn test_cash_sale_cannot_carry_credit_columns() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = sale(PaymentMethod::Cash, Some(terms()));
        let mut conn = db.pool().acquire().await.unwrap();
        let err = insert_sale(&mut conn, &s, created()).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[tokio::test]
    async fn test_mark_voided_only_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = sale(PaymentMethod::Qr, None);
        let mut conn = db.pool().acquire().await.unwrap();
        insert_sale(&mut conn, &s, created()).await.unwrap();

        assert!(mark_voided(&mut conn, &s.id, "admin", "wrong item").await.unwrap());
        assert!(!mark_voided(&mut conn, &s.id, "admin", "again").await.unwrap());
        drop(conn);

        let loaded = db.sales().get(&s.id).await.unwrap().unwrap();
        assert_eq!(loaded.state, SaleState::Voided);
        assert_eq!(loaded.cancellation_reason.as_deref(), Some("wrong item"));
    }

    #[tokio::test]
    async fn test_daily_totals_skip_voided() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let kept = sale(PaymentMethod::Cash, None);
        let voided = sale(PaymentMethod::Cash, None);
        let mut conn = db.pool().acquire().await.unwrap();
        insert_sale(&mut conn, &kept, created()).await.unwrap();
        insert_sale(&mut conn, &voided, created()).await.unwrap();
        mark_voided(&mut conn, &voided.id, "admin", "test").await.unwrap();
        drop(conn);

        let totals = db.sales().daily_totals(day()).await.unwrap();
        assert_eq!(
            totals,
            vec![PaymentMethodTotal {
                payment_method: PaymentMethod::Cash,
                sales: 1,
                total_cents: 100_000,
            }]
        );
    }
}
