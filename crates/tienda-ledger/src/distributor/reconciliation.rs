//! Reconciliation periods (arqueos) and the saldos carry-forward.
//!
//! ```text
//! open ──► period_start = today, opening_balances = saldos of last close
//!
//! close(saldos, cash) ─┬─ claim unreconciled entries of the period
//!                      ├─ totals, cash difference, saldos_restantes
//!                      └─ carried preregistros := saldos      (one tx)
//! ```
//!
//! A retail period covers the single day it was opened on: it closes on
//! `period_start` and claims only that day's entries, so yesterday's and
//! today's periods may be closed in either order. A wholesale period
//! claims everything not yet reconciled up to today, including entries
//! recorded before it was opened; only one wholesale period is ever open,
//! so nothing can be claimed by the wrong one.

use chrono::NaiveDate;
use tracing::info;

use tienda_core::distributor::{days_since, normalize_saldos, Reconciliation, ReconciliationState, SaldoRestante};
use tienda_core::validation::validate_cash_amount;
use tienda_core::{CoreError, Money};
use tienda_db::repository::distributor as store;
use tienda_db::{new_id, DbError};

use super::DistributorEngine;
use crate::clock::minute_of;
use crate::error::{LedgerError, LedgerResult};

impl DistributorEngine {
    /// Opens a reconciliation period for a distributor.
    ///
    /// ## Errors
    /// * `ReconciliationOpen` - Wholesale: any period still open. Retail: a
    ///   period already open for today.
    pub async fn open_reconciliation(&self, distributor_id: &str) -> LedgerResult<Reconciliation> {
        let distributor = self.distributor(distributor_id).await?;
        let now = self.clock.now();
        let today = now.date();

        let mut conn = self.db.pool().acquire().await?;
        if store::find_open_reconciliation(&mut conn, &distributor.id, self.channel, today)
            .await?
            .is_some()
        {
            return Err(LedgerError::ReconciliationOpen {
                distributor_id: distributor.id,
            });
        }
        let opening_balances = store::last_closed_reconciliation(&mut conn, &distributor.id)
            .await?
            .map(|last| last.saldos_restantes)
            .unwrap_or_default();

        let rec = Reconciliation {
            id: new_id(),
            distributor_id: distributor.id.clone(),
            channel: self.channel,
            period_start: today,
            period_end: None,
            opened_at: minute_of(now),
            closed_at: None,
            opening_balances,
            saldos_restantes: Vec::new(),
            sales_total_cents: 0,
            quantity_sold: 0,
            cash_received_cents: None,
            cash_difference_cents: None,
            state: ReconciliationState::Open,
        };
        store::insert_reconciliation(&mut conn, &rec)
            .await
            .map_err(|e| match e {
                DbError::UniqueViolation { .. } => LedgerError::ReconciliationOpen {
                    distributor_id: distributor.id.clone(),
                },
                other => other.into(),
            })?;

        info!(
            id = %rec.id,
            distributor_id = %rec.distributor_id,
            channel = self.channel.as_str(),
            carried = rec.opening_balances.len(),
            "Reconciliation opened"
        );
        Ok(rec)
    }

    /// Closes a period with the counted saldos and the cash handed over.
    pub async fn close_reconciliation(
        &self,
        reconciliation_id: &str,
        saldos: Vec<SaldoRestante>,
        cash_received_cents: i64,
    ) -> LedgerResult<Reconciliation> {
        validate_cash_amount("cash received", cash_received_cents)?;
        let saldos = normalize_saldos(saldos)?;
        let now = self.clock.now();

        let mut tx = self.db.pool().begin().await?;
        let mut rec = store::get_reconciliation(&mut tx, reconciliation_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Reconciliation", reconciliation_id))?;
        self.ensure_channel(&rec.distributor_id, rec.channel)?;

        let (claim_from, close_on) = if self.channel.is_daily() {
            (Some(rec.period_start), rec.period_start)
        } else {
            (None, now.date())
        };

        if rec.is_open() {
            store::claim_sales(&mut tx, &rec.distributor_id, claim_from, close_on, &rec.id).await?;
        }
        let sales = store::period_sales(&mut tx, &rec.id).await?;
        rec.close(close_on, minute_of(now), sales, saldos, Money::from_cents(cash_received_cents))?;

        if !store::store_close(&mut tx, &rec).await? {
            return Err(CoreError::InvalidTransition {
                entity: "Reconciliation",
                id: rec.id.clone(),
                from: "closed".to_string(),
                to: "closed".to_string(),
            }
            .into());
        }
        store::replace_carried(&mut tx, &rec.distributor_id, &rec.id, &rec.saldos_restantes, now).await?;
        tx.commit().await?;

        info!(
            id = %rec.id,
            distributor_id = %rec.distributor_id,
            period_end = %close_on,
            total = rec.sales_total_cents,
            difference = ?rec.cash_difference_cents,
            saldos = rec.saldos_restantes.len(),
            "Reconciliation closed"
        );
        Ok(rec)
    }

    pub async fn reconciliation(&self, reconciliation_id: &str) -> LedgerResult<Reconciliation> {
        let rec = self
            .db
            .distributors()
            .get_reconciliation(reconciliation_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Reconciliation", reconciliation_id))?;
        self.ensure_channel(&rec.distributor_id, rec.channel)?;
        Ok(rec)
    }

    pub async fn last_closed(&self, distributor_id: &str) -> LedgerResult<Option<Reconciliation>> {
        self.distributor(distributor_id).await?;
        Ok(self.db.distributors().last_closed_reconciliation(distributor_id).await?)
    }

    /// Days between the end of the last closed period and `today`.
    ///
    /// `None` when the distributor has never been reconciled.
    pub async fn days_since_last_reconciliation(
        &self,
        distributor_id: &str,
        today: NaiveDate,
    ) -> LedgerResult<Option<i64>> {
        let last = self.last_closed(distributor_id).await?;
        Ok(days_since(last.and_then(|rec| rec.period_end), today))
    }
}
