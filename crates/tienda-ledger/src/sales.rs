//! # Sale Engine
//!
//! Creates and cancels sales. Each is one SQLite transaction; dropping the
//! transaction on any error is the rollback.
//!
//! ## Create
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate ──► stock pre-check ──► BEGIN                                 │
//! │                                     │ insert sale (credit terms if any) │
//! │                                     │ insert details ── DetailInsertFailed
//! │                                     │ per line: conditional decrement   │
//! │                                     │           + out/sale movement     │
//! │                                     │ non-credit + write-through:       │
//! │                                     │           register += total       │
//! │                                   COMMIT                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancel
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  load ── NotFound / AlreadyVoided / StaleCancellation (not today)       │
//! │  BEGIN                                                                  │
//! │    per line: stock += qty, in/return movement                           │
//! │    completed → voided (conditional; lost race = AlreadyVoided)          │
//! │  COMMIT                                                                 │
//! │  non-credit: register −= total, floored at 0   (failure only logged)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use tienda_core::credit::InterestPolicy;
use tienda_core::ticket::TicketLine;
use tienda_core::validation::{validate_new_sale, validate_reference};
use tienda_core::{CoreError, CreditTerms, Money, NewSale, Sale, SaleDetail, SaleState, SaleWithDetails};
use tienda_db::repository::{register, sale};
use tienda_db::{new_id, Database, PaymentMethodTotal};

use crate::clock::{minute_of, Clock};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::register::RegisterEngine;
use crate::stock::{restock_for_cancellation, take_for_sale, StockLedger};

/// Completed sales of one day.
#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub by_method: Vec<PaymentMethodTotal>,
    pub sales: i64,
    pub total_cents: i64,
    /// Cash, QR and transfer: what the register should have seen.
    pub register_cents: i64,
    /// Credit payments received that day.
    pub credit_collected_cents: i64,
}

#[derive(Debug, Clone)]
pub struct SaleEngine {
    db: Database,
    stock: StockLedger,
    registers: RegisterEngine,
    clock: Arc<dyn Clock>,
    register_write_through: bool,
    policy: InterestPolicy,
}

impl SaleEngine {
    pub fn new(db: Database, config: &LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        SaleEngine {
            stock: StockLedger::new(db.clone(), clock.clone()),
            registers: RegisterEngine::new(db.clone(), clock.clone()),
            db,
            clock,
            register_write_through: config.register_write_through,
            policy: config.interest_policy(),
        }
    }

    /// Records a sale and takes its stock.
    ///
    /// Date and time come from the engine clock, never from the caller.
    pub async fn create(&self, input: NewSale) -> LedgerResult<SaleWithDetails> {
        validate_new_sale(&input)?;
        self.stock.reserve_for_sale(&input.items).await?;

        let now = self.clock.now();
        let today = now.date();
        let total = input.total();

        let credit = match (&input.credit, input.payment_method.is_credit()) {
            (Some(request), true) => Some(CreditTerms::open(
                today,
                total,
                request.installments,
                request.monthly_rate,
                Money::from_cents(request.down_payment_cents),
                self.policy,
            )),
            _ => None,
        };

        let created = Sale {
            id: new_id(),
            sale_date: today,
            sale_time: minute_of(now),
            total_cents: total.cents(),
            payment_method: input.payment_method,
            client_id: input.client_id,
            seller_id: input.seller_id,
            state: SaleState::Completed,
            credit,
            cancelled_by: None,
            cancellation_reason: None,
        };
        let details: Vec<SaleDetail> = input
            .items
            .iter()
            .map(|item| SaleDetail {
                id: new_id(),
                sale_id: created.id.clone(),
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                subtotal_cents: item.subtotal().cents(),
            })
            .collect();

        let mut tx = self.db.pool().begin().await?;
        sale::insert_sale(&mut tx, &created, now).await?;
        sale::insert_details(&mut tx, &details)
            .await
            .map_err(LedgerError::DetailInsertFailed)?;
        take_for_sale(&mut tx, &created.id, &details, &created.seller_id, now).await?;

        if self.register_write_through && created.payment_method.feeds_register() {
            let applied = register::add_sales(&mut tx, today, created.total_cents).await?;
            if !applied {
                debug!(sale_id = %created.id, "No open register for today; total not applied");
            }
        }
        tx.commit().await?;

        info!(
            sale_id = %created.id,
            method = created.payment_method.as_str(),
            total = %created.total(),
            items = details.len(),
            "Sale created"
        );
        Ok(SaleWithDetails { sale: created, details })
    }

    /// Voids a sale made today and puts its stock back.
    pub async fn cancel(&self, sale_id: &str, cancelled_by: &str, reason: &str) -> LedgerResult<Sale> {
        validate_reference("cancelled_by", cancelled_by)?;
        validate_reference("reason", reason)?;

        let now = self.clock.now();
        let (target, details) = {
            let mut conn = self.db.pool().acquire().await?;
            let target = sale::get(&mut conn, sale_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
            target.ensure_cancellable(now.date())?;
            let details = sale::details(&mut conn, sale_id).await?;
            (target, details)
        };

        let mut tx = self.db.pool().begin().await?;
        restock_for_cancellation(&mut tx, sale_id, &details, cancelled_by, reason, now).await?;
        if !sale::mark_voided(&mut tx, sale_id, cancelled_by, reason).await? {
            return Err(CoreError::AlreadyVoided(sale_id.to_string()).into());
        }
        tx.commit().await?;

        info!(sale_id = %sale_id, cancelled_by = %cancelled_by, items = details.len(), "Sale cancelled");

        if target.payment_method.feeds_register() {
            self.revert_register(&target).await;
        }

        let mut voided = target;
        voided.state = SaleState::Voided;
        voided.cancelled_by = Some(cancelled_by.to_string());
        voided.cancellation_reason = Some(reason.to_string());
        Ok(voided)
    }

    /// Best effort: the cancellation stands even if this fails.
    async fn revert_register(&self, target: &Sale) {
        if let Err(e) = self.registers.revert_sale(target.sale_date, target.total_cents).await {
            warn!(
                sale_id = %target.id,
                amount = target.total_cents,
                error = %e,
                "Register total not reverted after cancellation"
            );
        }
    }

    pub async fn get(&self, sale_id: &str) -> LedgerResult<SaleWithDetails> {
        self.db
            .sales()
            .get_with_details(sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))
    }

    pub async fn list_by_date(&self, date: NaiveDate) -> LedgerResult<Vec<Sale>> {
        Ok(self.db.sales().list_by_date(date).await?)
    }

    pub async fn daily_summary(&self, date: NaiveDate) -> LedgerResult<DailySummary> {
        let by_method = self.db.sales().daily_totals(date).await?;
        let credit_collected_cents = self.db.credit_payments().collected_on(date).await?;

        let sales = by_method.iter().map(|t| t.sales).sum();
        let total_cents = by_method.iter().map(|t| t.total_cents).sum();
        let register_cents = by_method
            .iter()
            .filter(|t| t.payment_method.feeds_register())
            .map(|t| t.total_cents)
            .sum();

        Ok(DailySummary {
            date,
            by_method,
            sales,
            total_cents,
            register_cents,
            credit_collected_cents,
        })
    }

    /// Printable lines of a sale, with product names resolved.
    ///
    /// A product deleted since the sale shows its id instead of a name.
    pub async fn ticket(&self, sale_id: &str) -> LedgerResult<Vec<TicketLine>> {
        let found = self.get(sale_id).await?;
        let products = self.db.products();
        let mut lines = Vec::with_capacity(found.details.len());
        for detail in found.details {
            let name = match products.get(&detail.product_id).await? {
                Some(p) => p.name,
                None => detail.product_id.clone(),
            };
            lines.push(TicketLine::Sale { detail, name });
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ErrorKind;
    use tienda_core::ticket::ticket_total;
    use tienda_core::{MovementReason, NewProduct, NewSaleItem, PaymentMethod, Product};
    use tienda_db::DbConfig;

    struct Harness {
        sales: SaleEngine,
        stock: StockLedger,
        registers: RegisterEngine,
        clock: Arc<FixedClock>,
        db: Database,
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    async fn harness_with(config: LedgerConfig) -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(FixedClock::at(day().and_hms_opt(10, 15, 0).unwrap()));
        Harness {
            sales: SaleEngine::new(db.clone(), &config, clock.clone()),
            stock: StockLedger::new(db.clone(), clock.clone()),
            registers: RegisterEngine::new(db.clone(), clock.clone()),
            clock,
            db,
        }
    }

    async fn harness() -> Harness {
        harness_with(LedgerConfig::with_database(":memory:")).await
    }

    async fn product(h: &Harness, name: &str, price: i64, stock: i64) -> Product {
        h.stock
            .create_product(
                NewProduct {
                    name: name.into(),
                    unit_price_cents: price,
                    wholesale_price_cents: None,
                    initial_stock: stock,
                    min_stock: 0,
                },
                "admin",
            )
            .await
            .unwrap()
    }

    fn cash_sale(lines: &[(&Product, i64)]) -> NewSale {
        NewSale {
            payment_method: PaymentMethod::Cash,
            client_id: None,
            seller_id: "vendedor-1".into(),
            items: lines
                .iter()
                .map(|(p, qty)| NewSaleItem {
                    product_id: p.id.clone(),
                    quantity: *qty,
                    unit_price_cents: p.unit_price_cents,
                })
                .collect(),
            credit: None,
        }
    }

    #[tokio::test]
    async fn test_sale_takes_stock_and_writes_movements() {
        let h = harness().await;
        let arroz = product(&h, "Arroz", 850, 10).await;
        let aceite = product(&h, "Aceite", 1_500, 4).await;

        let created = h
            .sales
            .create(cash_sale(&[(&arroz, 3), (&aceite, 2)]))
            .await
            .unwrap();
        assert_eq!(created.sale.total_cents, 3 * 850 + 2 * 1_500);
        assert_eq!(created.sale.sale_date, day());
        assert!(created.sale.credit.is_none());
        assert_eq!(created.details.len(), 2);

        assert_eq!(h.stock.product(&arroz.id).await.unwrap().current_stock, 7);
        assert_eq!(h.stock.product(&aceite.id).await.unwrap().current_stock, 2);

        let movements = h.db.movements().list_for_sale(&created.sale.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.reason == MovementReason::Sale));
        assert!(h.stock.verify_product(&arroz.id).await.unwrap().consistent);
    }

    #[tokio::test]
    async fn test_sale_time_reads_back_as_created() {
        let h = harness().await;
        let pan = product(&h, "Pan", 200, 10).await;
        h.clock.set(day().and_hms_opt(10, 15, 37).unwrap());

        let created = h.sales.create(cash_sale(&[(&pan, 1)])).await.unwrap();
        assert_eq!(created.sale.sale_time, chrono::NaiveTime::from_hms_opt(10, 15, 0).unwrap());
        let stored = h.sales.get(&created.sale.id).await.unwrap();
        assert_eq!(stored.sale.sale_time, created.sale.sale_time);
    }

    #[tokio::test]
    async fn test_huge_line_price_is_rejected_not_overflowed() {
        let h = harness().await;
        let oro = product(&h, "Oro", 1_000, 10).await;

        let mut input = cash_sale(&[(&oro, 3)]);
        input.items[0].unit_price_cents = i64::MAX / 2;
        let err = h.sales.create(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(h.stock.product(&oro.id).await.unwrap().current_stock, 10);
        assert!(h.sales.list_by_date(day()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_selling_exact_stock_then_one_more() {
        let h = harness().await;
        let leche = product(&h, "Leche", 450, 10).await;

        h.sales.create(cash_sale(&[(&leche, 10)])).await.unwrap();
        assert_eq!(h.stock.product(&leche.id).await.unwrap().current_stock, 0);

        let err = h.sales.create(cash_sale(&[(&leche, 1)])).await.unwrap_err();
        match err {
            LedgerError::Domain(CoreError::InsufficientStock {
                available, requested, ..
            }) => {
                assert_eq!(available, 0);
                assert_eq!(requested, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.stock.product(&leche.id).await.unwrap().current_stock, 0);
        assert_eq!(h.sales.list_by_date(day()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock() {
        let h = harness().await;
        let azucar = product(&h, "Azúcar", 700, 8).await;

        let created = h.sales.create(cash_sale(&[(&azucar, 5)])).await.unwrap();
        let voided = h
            .sales
            .cancel(&created.sale.id, "admin", "cliente desistió")
            .await
            .unwrap();
        assert_eq!(voided.state, SaleState::Voided);
        assert_eq!(voided.cancelled_by.as_deref(), Some("admin"));
        assert_eq!(h.stock.product(&azucar.id).await.unwrap().current_stock, 8);

        let movements = h.db.movements().list_for_sale(&created.sale.id).await.unwrap();
        let back = movements.iter().find(|m| m.reason == MovementReason::Return).unwrap();
        assert_eq!(back.cancellation_reason.as_deref(), Some("cliente desistió"));
        assert!(back.note.as_deref().unwrap().contains("admin"));
        assert!(h.stock.verify_product(&azucar.id).await.unwrap().consistent);

        let stored = h.sales.get(&created.sale.id).await.unwrap();
        assert_eq!(stored.sale.state, SaleState::Voided);
    }

    #[tokio::test]
    async fn test_cancel_twice_is_already_voided() {
        let h = harness().await;
        let sal = product(&h, "Sal", 150, 3).await;
        let created = h.sales.create(cash_sale(&[(&sal, 1)])).await.unwrap();
        h.sales.cancel(&created.sale.id, "admin", "error").await.unwrap();

        let err = h.sales.cancel(&created.sale.id, "admin", "error").await.unwrap_err();
        assert!(matches!(err, LedgerError::Domain(CoreError::AlreadyVoided(_))));
        assert_eq!(h.stock.product(&sal.id).await.unwrap().current_stock, 3);
    }

    #[tokio::test]
    async fn test_cancel_next_day_is_stale() {
        let h = harness().await;
        let fideos = product(&h, "Fideos", 600, 6).await;
        let created = h.sales.create(cash_sale(&[(&fideos, 2)])).await.unwrap();

        h.clock.advance_days(1);
        let err = h.sales.cancel(&created.sale.id, "admin", "tarde").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StaleOperation);
        assert_eq!(h.stock.product(&fideos.id).await.unwrap().current_stock, 4);
        assert_eq!(h.sales.get(&created.sale.id).await.unwrap().sale.state, SaleState::Completed);

        let err = h.sales.cancel("missing", "admin", "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_register_follows_cash_sale_and_cancellation() {
        let h = harness().await;
        let cafe = product(&h, "Café", 5_000, 5).await;
        let session = h.registers.open(0, "admin").await.unwrap();
        h.registers.apply_sale(day(), 10_000).await.unwrap();

        let created = h.sales.create(cash_sale(&[(&cafe, 1)])).await.unwrap();
        assert_eq!(h.registers.get(&session.id).await.unwrap().total_sales_cents, 15_000);

        h.sales.cancel(&created.sale.id, "admin", "devuelto").await.unwrap();
        assert_eq!(h.registers.get(&session.id).await.unwrap().total_sales_cents, 10_000);
    }

    #[tokio::test]
    async fn test_write_through_disabled() {
        let mut config = LedgerConfig::with_database(":memory:");
        config.register_write_through = false;
        let h = harness_with(config).await;
        let cafe = product(&h, "Café", 5_000, 5).await;
        let session = h.registers.open(0, "admin").await.unwrap();

        h.sales.create(cash_sale(&[(&cafe, 1)])).await.unwrap();
        assert_eq!(h.registers.get(&session.id).await.unwrap().total_sales_cents, 0);
    }

    #[tokio::test]
    async fn test_sale_without_open_register_still_succeeds() {
        let h = harness().await;
        let te = product(&h, "Té", 300, 2).await;
        let created = h.sales.create(cash_sale(&[(&te, 1)])).await.unwrap();
        h.sales.cancel(&created.sale.id, "admin", "prueba").await.unwrap();
        assert_eq!(h.stock.product(&te.id).await.unwrap().current_stock, 2);
    }

    #[tokio::test]
    async fn test_credit_requires_client() {
        let h = harness().await;
        let tv = product(&h, "Televisor", 100_000, 1).await;
        let mut input = cash_sale(&[(&tv, 1)]);
        input.payment_method = PaymentMethod::Credit;

        let err = h.sales.create(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.stock.product(&tv.id).await.unwrap().current_stock, 1);
    }

    #[tokio::test]
    async fn test_daily_summary_and_ticket() {
        let h = harness().await;
        let pan = product(&h, "Pan", 200, 50).await;

        let kept = h.sales.create(cash_sale(&[(&pan, 5)])).await.unwrap();
        let mut qr = cash_sale(&[(&pan, 2)]);
        qr.payment_method = PaymentMethod::Qr;
        h.sales.create(qr).await.unwrap();
        let voided = h.sales.create(cash_sale(&[(&pan, 10)])).await.unwrap();
        h.sales.cancel(&voided.sale.id, "admin", "error").await.unwrap();

        let summary = h.sales.daily_summary(day()).await.unwrap();
        assert_eq!(summary.sales, 2);
        assert_eq!(summary.total_cents, 1_400);
        assert_eq!(summary.register_cents, 1_400);
        assert_eq!(summary.credit_collected_cents, 0);

        let lines = h.sales.ticket(&kept.sale.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].description(), "Pan");
        assert_eq!(ticket_total(&lines).cents(), kept.sale.total_cents);
    }
}
