//! # Distributor Repository
//!
//! Persistence for both distributor tracks (wholesale and retail): the
//! distributors themselves, their sale entries, reconciliations,
//! preregistros, payments and reconciliation notices.
//!
//! ## Claiming Sales
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  distributor_sales.reconciliation_id                                    │
//! │                                                                         │
//! │  NULL ─────── close reconciliation R ───────► R                         │
//! │   (unreconciled)   claim: distributor match,    (accounted for, never   │
//! │                    sale_date <= period end      claimed again)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Saldos are stored as JSON arrays in the reconciliation row.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{format_time, new_id, parse_optional_time, parse_time};
use tienda_core::distributor::{
    Channel, Distributor, DistributorPayment, DistributorSale, NoticeState, PeriodSales, Preregistro,
    PreregistroSource, Reconciliation, ReconciliationNotice, ReconciliationState, SaldoRestante,
};
use tienda_core::Money;

const SALE_COLUMNS: &str = "id, distributor_id, channel, product_id, quantity_sold, quantity_top_up, \
     unit_price_cents, total_cents, sale_date, sale_time, order_id, reconciliation_id";

const RECONCILIATION_COLUMNS: &str = "id, distributor_id, channel, period_start, period_end, \
     opened_at, closed_at, opening_balances, saldos_restantes, sales_total_cents, quantity_sold, \
     cash_received_cents, cash_difference_cents, state";

const PREREGISTRO_COLUMNS: &str =
    "id, distributor_id, product_id, quantity, source, reconciliation_id, created_at";

const PAYMENT_COLUMNS: &str = "id, distributor_sale_id, distributor_id, expected_cents, \
     received_cents, verified_by, verified_at, state, created_at";

const NOTICE_COLUMNS: &str =
    "id, distributor_id, days_without_reconciliation, state, created_at, updated_at";

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct DistributorSaleRow {
    id: String,
    distributor_id: String,
    channel: Channel,
    product_id: String,
    quantity_sold: i64,
    quantity_top_up: i64,
    unit_price_cents: i64,
    total_cents: i64,
    sale_date: NaiveDate,
    sale_time: String,
    order_id: Option<String>,
    reconciliation_id: Option<String>,
}

impl TryFrom<DistributorSaleRow> for DistributorSale {
    type Error = DbError;

    fn try_from(row: DistributorSaleRow) -> DbResult<Self> {
        Ok(DistributorSale {
            sale_time: parse_time("sale_time", &row.sale_time)?,
            id: row.id,
            distributor_id: row.distributor_id,
            channel: row.channel,
            product_id: row.product_id,
            quantity_sold: row.quantity_sold,
            quantity_top_up: row.quantity_top_up,
            unit_price_cents: row.unit_price_cents,
            total_cents: row.total_cents,
            sale_date: row.sale_date,
            order_id: row.order_id,
            reconciliation_id: row.reconciliation_id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReconciliationRow {
    id: String,
    distributor_id: String,
    channel: Channel,
    period_start: NaiveDate,
    period_end: Option<NaiveDate>,
    opened_at: String,
    closed_at: Option<String>,
    opening_balances: String,
    saldos_restantes: String,
    sales_total_cents: i64,
    quantity_sold: i64,
    cash_received_cents: Option<i64>,
    cash_difference_cents: Option<i64>,
    state: ReconciliationState,
}

impl TryFrom<ReconciliationRow> for Reconciliation {
    type Error = DbError;

    fn try_from(row: ReconciliationRow) -> DbResult<Self> {
        Ok(Reconciliation {
            opened_at: parse_time("opened_at", &row.opened_at)?,
            closed_at: parse_optional_time("closed_at", row.closed_at.as_deref())?,
            opening_balances: decode_saldos("opening_balances", &row.opening_balances)?,
            saldos_restantes: decode_saldos("saldos_restantes", &row.saldos_restantes)?,
            id: row.id,
            distributor_id: row.distributor_id,
            channel: row.channel,
            period_start: row.period_start,
            period_end: row.period_end,
            sales_total_cents: row.sales_total_cents,
            quantity_sold: row.quantity_sold,
            cash_received_cents: row.cash_received_cents,
            cash_difference_cents: row.cash_difference_cents,
            state: row.state,
        })
    }
}

fn encode_saldos(saldos: &[SaldoRestante]) -> DbResult<String> {
    serde_json::to_string(saldos).map_err(|e| DbError::Internal(format!("encoding saldos: {e}")))
}

fn decode_saldos(column: &'static str, raw: &str) -> DbResult<Vec<SaldoRestante>> {
    serde_json::from_str(raw).map_err(|e| DbError::Decode {
        column,
        reason: e.to_string(),
    })
}

// =============================================================================
// Distributors
// =============================================================================

pub async fn insert_distributor(conn: &mut SqliteConnection, distributor: &Distributor) -> DbResult<()> {
    debug!(id = %distributor.id, name = %distributor.name, channel = ?distributor.channel, "Inserting distributor");

    sqlx::query(
        "INSERT INTO distributors (id, name, channel, active, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&distributor.id)
    .bind(&distributor.name)
    .bind(distributor.channel)
    .bind(distributor.active)
    .bind(distributor.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_distributor(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Distributor>> {
    let distributor = sqlx::query_as::<_, Distributor>(
        "SELECT id, name, channel, active, created_at FROM distributors WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(distributor)
}

// =============================================================================
// Distributor sales
// =============================================================================

pub async fn insert_sale(
    conn: &mut SqliteConnection,
    sale: &DistributorSale,
    created_at: NaiveDateTime,
) -> DbResult<()> {
    debug!(
        id = %sale.id,
        distributor_id = %sale.distributor_id,
        product_id = %sale.product_id,
        total = sale.total_cents,
        "Inserting distributor sale"
    );

    sqlx::query(
        r#"
        INSERT INTO distributor_sales (
            id, distributor_id, channel, product_id, quantity_sold, quantity_top_up,
            unit_price_cents, total_cents, sale_date, sale_time, order_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.distributor_id)
    .bind(sale.channel)
    .bind(&sale.product_id)
    .bind(sale.quantity_sold)
    .bind(sale.quantity_top_up)
    .bind(sale.unit_price_cents)
    .bind(sale.total_cents)
    .bind(sale.sale_date)
    .bind(format_time(sale.sale_time))
    .bind(&sale.order_id)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_sale(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<DistributorSale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM distributor_sales WHERE id = ?1");
    let row = sqlx::query_as::<_, DistributorSaleRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(DistributorSale::try_from).transpose()
}

/// Assigns the distributor's unreconciled sales dated within `from..=up_to`
/// to the reconciliation. `from: None` leaves the range open below.
/// Returns the number of rows claimed.
pub async fn claim_sales(
    conn: &mut SqliteConnection,
    distributor_id: &str,
    from: Option<NaiveDate>,
    up_to: NaiveDate,
    reconciliation_id: &str,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE distributor_sales
        SET reconciliation_id = ?1
        WHERE distributor_id = ?2 AND reconciliation_id IS NULL
          AND sale_date <= ?3 AND (?4 IS NULL OR sale_date >= ?4)
        "#,
    )
    .bind(reconciliation_id)
    .bind(distributor_id)
    .bind(up_to)
    .bind(from)
    .execute(&mut *conn)
    .await?;

    debug!(
        distributor_id = %distributor_id,
        reconciliation_id = %reconciliation_id,
        claimed = result.rows_affected(),
        "Claimed distributor sales"
    );
    Ok(result.rows_affected())
}

/// Totals of the sales claimed by a reconciliation.
pub async fn period_sales(conn: &mut SqliteConnection, reconciliation_id: &str) -> DbResult<PeriodSales> {
    let (entries, quantity_sold, total_cents): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COALESCE(SUM(quantity_sold), 0), COALESCE(SUM(total_cents), 0)
        FROM distributor_sales
        WHERE reconciliation_id = ?1
        "#,
    )
    .bind(reconciliation_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(PeriodSales {
        entries,
        quantity_sold,
        total: Money::from_cents(total_cents),
    })
}

// =============================================================================
// Reconciliations
// =============================================================================

pub async fn insert_reconciliation(conn: &mut SqliteConnection, rec: &Reconciliation) -> DbResult<()> {
    debug!(
        id = %rec.id,
        distributor_id = %rec.distributor_id,
        channel = ?rec.channel,
        period_start = %rec.period_start,
        carried = rec.opening_balances.len(),
        "Opening reconciliation"
    );

    sqlx::query(
        r#"
        INSERT INTO reconciliations (
            id, distributor_id, channel, period_start, period_end, opened_at,
            opening_balances, saldos_restantes, state
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&rec.id)
    .bind(&rec.distributor_id)
    .bind(rec.channel)
    .bind(rec.period_start)
    .bind(rec.period_end)
    .bind(format_time(rec.opened_at))
    .bind(encode_saldos(&rec.opening_balances)?)
    .bind(encode_saldos(&rec.saldos_restantes)?)
    .bind(rec.state)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_reconciliation(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Reconciliation>> {
    let sql = format!("SELECT {RECONCILIATION_COLUMNS} FROM reconciliations WHERE id = ?1");
    let row = sqlx::query_as::<_, ReconciliationRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Reconciliation::try_from).transpose()
}

/// The open reconciliation that blocks opening a new one.
///
/// Wholesale: any open period of the distributor. Retail: the open one for `day`.
pub async fn find_open_reconciliation(
    conn: &mut SqliteConnection,
    distributor_id: &str,
    channel: Channel,
    day: NaiveDate,
) -> DbResult<Option<Reconciliation>> {
    let row = match channel {
        Channel::Wholesale => {
            let sql = format!(
                "SELECT {RECONCILIATION_COLUMNS} FROM reconciliations \
                 WHERE distributor_id = ?1 AND state = 'open'"
            );
            sqlx::query_as::<_, ReconciliationRow>(&sql)
                .bind(distributor_id)
                .fetch_optional(&mut *conn)
                .await?
        }
        Channel::Retail => {
            let sql = format!(
                "SELECT {RECONCILIATION_COLUMNS} FROM reconciliations \
                 WHERE distributor_id = ?1 AND state = 'open' AND period_start = ?2"
            );
            sqlx::query_as::<_, ReconciliationRow>(&sql)
                .bind(distributor_id)
                .bind(day)
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    row.map(Reconciliation::try_from).transpose()
}

/// Most recent closed reconciliation of a distributor.
pub async fn last_closed_reconciliation(
    conn: &mut SqliteConnection,
    distributor_id: &str,
) -> DbResult<Option<Reconciliation>> {
    let sql = format!(
        "SELECT {RECONCILIATION_COLUMNS} FROM reconciliations \
         WHERE distributor_id = ?1 AND state = 'closed' \
         ORDER BY period_end DESC, closed_at DESC, rowid DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, ReconciliationRow>(&sql)
        .bind(distributor_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Reconciliation::try_from).transpose()
}

/// Persists a reconciliation that has gone through [`Reconciliation::close`].
pub async fn store_close(conn: &mut SqliteConnection, rec: &Reconciliation) -> DbResult<bool> {
    debug!(
        id = %rec.id,
        total = rec.sales_total_cents,
        difference = ?rec.cash_difference_cents,
        saldos = rec.saldos_restantes.len(),
        "Closing reconciliation"
    );

    let result = sqlx::query(
        r#"
        UPDATE reconciliations
        SET period_end = ?1, closed_at = ?2, saldos_restantes = ?3, sales_total_cents = ?4,
            quantity_sold = ?5, cash_received_cents = ?6, cash_difference_cents = ?7, state = 'closed'
        WHERE id = ?8 AND state = 'open'
        "#,
    )
    .bind(rec.period_end)
    .bind(rec.closed_at.map(format_time))
    .bind(encode_saldos(&rec.saldos_restantes)?)
    .bind(rec.sales_total_cents)
    .bind(rec.quantity_sold)
    .bind(rec.cash_received_cents)
    .bind(rec.cash_difference_cents)
    .bind(&rec.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Preregistros
// =============================================================================

pub async fn insert_preregistro(conn: &mut SqliteConnection, pre: &Preregistro) -> DbResult<()> {
    debug!(
        id = %pre.id,
        distributor_id = %pre.distributor_id,
        product_id = %pre.product_id,
        quantity = pre.quantity,
        source = ?pre.source,
        "Inserting preregistro"
    );

    sqlx::query(
        r#"
        INSERT INTO preregistros (id, distributor_id, product_id, quantity, source, reconciliation_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&pre.id)
    .bind(&pre.distributor_id)
    .bind(&pre.product_id)
    .bind(pre.quantity)
    .bind(pre.source)
    .bind(&pre.reconciliation_id)
    .bind(pre.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn list_preregistros(conn: &mut SqliteConnection, distributor_id: &str) -> DbResult<Vec<Preregistro>> {
    let sql = format!(
        "SELECT {PREREGISTRO_COLUMNS} FROM preregistros WHERE distributor_id = ?1 ORDER BY created_at, rowid"
    );
    let rows = sqlx::query_as::<_, Preregistro>(&sql)
        .bind(distributor_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

/// Replaces the distributor's carried allowances with the saldos of a
/// just-closed reconciliation. Manual preregistros are left alone.
pub async fn replace_carried(
    conn: &mut SqliteConnection,
    distributor_id: &str,
    reconciliation_id: &str,
    saldos: &[SaldoRestante],
    at: NaiveDateTime,
) -> DbResult<()> {
    let removed = sqlx::query("DELETE FROM preregistros WHERE distributor_id = ?1 AND source = 'carry'")
        .bind(distributor_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    debug!(distributor_id = %distributor_id, removed, carried = saldos.len(), "Replacing carried preregistros");

    for saldo in saldos {
        let pre = Preregistro {
            id: new_id(),
            distributor_id: distributor_id.to_string(),
            product_id: saldo.product_id.clone(),
            quantity: saldo.remaining,
            source: PreregistroSource::Carry,
            reconciliation_id: Some(reconciliation_id.to_string()),
            created_at: at,
        };
        insert_preregistro(conn, &pre).await?;
    }
    Ok(())
}

// =============================================================================
// Payments
// =============================================================================

pub async fn insert_payment(conn: &mut SqliteConnection, payment: &DistributorPayment) -> DbResult<()> {
    debug!(
        id = %payment.id,
        distributor_sale_id = %payment.distributor_sale_id,
        expected = payment.expected_cents,
        "Creating distributor payment"
    );

    sqlx::query(
        r#"
        INSERT INTO distributor_payments (
            id, distributor_sale_id, distributor_id, expected_cents, state, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.distributor_sale_id)
    .bind(&payment.distributor_id)
    .bind(payment.expected_cents)
    .bind(payment.state)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_payment(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<DistributorPayment>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM distributor_payments WHERE id = ?1");
    let payment = sqlx::query_as::<_, DistributorPayment>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(payment)
}

/// Persists a verified payment; `false` if it was no longer pending.
pub async fn store_verification(conn: &mut SqliteConnection, payment: &DistributorPayment) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE distributor_payments
        SET received_cents = ?1, verified_by = ?2, verified_at = ?3, state = 'verified'
        WHERE id = ?4 AND state = 'pending'
        "#,
    )
    .bind(payment.received_cents)
    .bind(&payment.verified_by)
    .bind(payment.verified_at)
    .bind(&payment.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Notices
// =============================================================================

pub async fn insert_notice(conn: &mut SqliteConnection, notice: &ReconciliationNotice) -> DbResult<()> {
    debug!(
        id = %notice.id,
        distributor_id = %notice.distributor_id,
        days = notice.days_without_reconciliation,
        "Raising reconciliation notice"
    );

    sqlx::query(
        r#"
        INSERT INTO reconciliation_notices (
            id, distributor_id, days_without_reconciliation, state, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&notice.id)
    .bind(&notice.distributor_id)
    .bind(notice.days_without_reconciliation)
    .bind(notice.state)
    .bind(notice.created_at)
    .bind(notice.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_notice(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<ReconciliationNotice>> {
    let sql = format!("SELECT {NOTICE_COLUMNS} FROM reconciliation_notices WHERE id = ?1");
    let notice = sqlx::query_as::<_, ReconciliationNotice>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(notice)
}

/// Moves a notice from `from` to its current state. `false` if another
/// caller changed it first.
pub async fn store_notice_state(
    conn: &mut SqliteConnection,
    notice: &ReconciliationNotice,
    from: NoticeState,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE reconciliation_notices SET state = ?1, updated_at = ?2 WHERE id = ?3 AND state = ?4",
    )
    .bind(notice.state)
    .bind(notice.updated_at)
    .bind(&notice.id)
    .bind(from)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Repository
// =============================================================================

/// Read side of the distributor tables.
#[derive(Debug, Clone)]
pub struct DistributorRepository {
    pool: SqlitePool,
}

impl DistributorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DistributorRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Distributor>> {
        let mut conn = self.pool.acquire().await?;
        get_distributor(&mut conn, id).await
    }

    pub async fn list(&self, channel: Channel) -> DbResult<Vec<Distributor>> {
        let rows = sqlx::query_as::<_, Distributor>(
            "SELECT id, name, channel, active, created_at FROM distributors WHERE channel = ?1 ORDER BY name",
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_sale(&self, id: &str) -> DbResult<Option<DistributorSale>> {
        let mut conn = self.pool.acquire().await?;
        get_sale(&mut conn, id).await
    }

    /// Sale entries of a distributor between two dates, inclusive.
    pub async fn list_sales(
        &self,
        distributor_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DbResult<Vec<DistributorSale>> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM distributor_sales \
             WHERE distributor_id = ?1 AND sale_date BETWEEN ?2 AND ?3 \
             ORDER BY sale_date, sale_time, rowid"
        );
        let rows = sqlx::query_as::<_, DistributorSaleRow>(&sql)
            .bind(distributor_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(DistributorSale::try_from).collect()
    }

    pub async fn get_reconciliation(&self, id: &str) -> DbResult<Option<Reconciliation>> {
        let mut conn = self.pool.acquire().await?;
        get_reconciliation(&mut conn, id).await
    }

    pub async fn last_closed_reconciliation(&self, distributor_id: &str) -> DbResult<Option<Reconciliation>> {
        let mut conn = self.pool.acquire().await?;
        last_closed_reconciliation(&mut conn, distributor_id).await
    }

    pub async fn preregistros(&self, distributor_id: &str) -> DbResult<Vec<Preregistro>> {
        let mut conn = self.pool.acquire().await?;
        list_preregistros(&mut conn, distributor_id).await
    }

    pub async fn get_payment(&self, id: &str) -> DbResult<Option<DistributorPayment>> {
        let mut conn = self.pool.acquire().await?;
        get_payment(&mut conn, id).await
    }

    /// Payments still waiting for an administrator.
    pub async fn pending_payments(&self) -> DbResult<Vec<DistributorPayment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM distributor_payments WHERE state = 'pending' ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, DistributorPayment>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_notice(&self, id: &str) -> DbResult<Option<ReconciliationNotice>> {
        let mut conn = self.pool.acquire().await?;
        get_notice(&mut conn, id).await
    }

    /// Notices not yet seen, most overdue first.
    pub async fn pending_notices(&self) -> DbResult<Vec<ReconciliationNotice>> {
        let sql = format!(
            "SELECT {NOTICE_COLUMNS} FROM reconciliation_notices WHERE state = 'pending' \
             ORDER BY days_without_reconciliation DESC, created_at"
        );
        let rows = sqlx::query_as::<_, ReconciliationNotice>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
