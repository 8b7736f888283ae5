//! # Credit & Interest Engine
//!
//! Every balance shown to a caller is recomputed from the sale, its terms
//! and its payment rows with [`tienda_core::credit::compute_credit_status`].
//! The projection columns on the sale row are refreshed on each write, but
//! nothing here reads them back.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use tienda_core::credit::{credit_status_of, ensure_payment_fits, CreditStatus, InterestPolicy};
use tienda_core::validation::validate_payment_amount;
use tienda_core::{CoreError, CreditPayment, NewCreditPayment, Sale, ValidationError};
use tienda_db::repository::{credit, sale};
use tienda_db::{new_id, Database};

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

/// A credit sale with its recomputed balance.
#[derive(Debug, Clone, Serialize)]
pub struct CreditAccount {
    pub sale: Sale,
    pub status: CreditStatus,
}

/// A recorded payment and the balance right after it.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub payment: CreditPayment,
    pub status: CreditStatus,
}

#[derive(Debug, Clone)]
pub struct CreditEngine {
    db: Database,
    clock: Arc<dyn Clock>,
    policy: InterestPolicy,
}

impl CreditEngine {
    pub fn new(db: Database, config: &LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        CreditEngine {
            db,
            clock,
            policy: config.interest_policy(),
        }
    }

    /// Balance of a credit sale as of today.
    ///
    /// A cancelled sale owes nothing and is reported as `AlreadyVoided`.
    pub async fn status(&self, sale_id: &str) -> LedgerResult<CreditStatus> {
        let target = self.credit_sale(sale_id).await?;
        if target.is_voided() {
            return Err(CoreError::AlreadyVoided(sale_id.to_string()).into());
        }
        let payments = self.db.credit_payments().list_for_sale(sale_id).await?;
        Ok(credit_status_of(&target, &payments, self.clock.today(), self.policy)?)
    }

    /// Records a payment against a credit sale.
    ///
    /// ## Errors
    /// * `NotCreditSale` - The sale was paid another way
    /// * `AlreadyVoided` - The sale was cancelled
    /// * `PaymentExceedsBalance` - More than the pending balance plus one cent
    pub async fn record_payment(&self, sale_id: &str, input: NewCreditPayment) -> LedgerResult<PaymentReceipt> {
        validate_payment_amount(input.amount_cents)?;
        if input.payment_method.is_credit() {
            return Err(ValidationError::NotAllowed {
                field: "payment_method".to_string(),
                reason: "a credit installment cannot be paid on credit".to_string(),
            }
            .into());
        }

        let now = self.clock.now();
        let today = now.date();

        let mut tx = self.db.pool().begin().await?;
        let mut target = sale::get(&mut tx, sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        if target.is_voided() {
            return Err(CoreError::AlreadyVoided(sale_id.to_string()).into());
        }

        let mut payments = credit::list_for_sale(&mut tx, sale_id).await?;
        let before = credit_status_of(&target, &payments, today, self.policy)?;
        let payment = CreditPayment {
            id: new_id(),
            sale_id: sale_id.to_string(),
            amount_cents: input.amount_cents,
            payment_date: today,
            payment_method: input.payment_method,
            installment_number: input.installment_number,
            note: input.note,
            created_at: now,
        };
        ensure_payment_fits(sale_id, &before, payment.amount())?;

        credit::insert(&mut tx, &payment).await?;
        payments.push(payment.clone());

        let status = credit_status_of(&target, &payments, today, self.policy)?;
        if let Some(terms) = target.credit.as_mut() {
            terms.apply_status(&status);
            sale::update_credit_projection(&mut tx, sale_id, terms).await?;
        }
        tx.commit().await?;

        info!(
            sale_id = %sale_id,
            amount = %payment.amount(),
            pending = %status.pending_balance,
            state = ?status.state,
            "Credit payment recorded"
        );
        Ok(PaymentReceipt { payment, status })
    }

    /// Turns interest on or off for a sale.
    ///
    /// Payments already recorded are left as they are; only the recomputed
    /// balance changes.
    pub async fn waive_interest(&self, sale_id: &str, waive: bool) -> LedgerResult<CreditStatus> {
        let mut tx = self.db.pool().begin().await?;
        let mut target = sale::get(&mut tx, sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        if target.is_voided() {
            return Err(CoreError::AlreadyVoided(sale_id.to_string()).into());
        }
        let payments = credit::list_for_sale(&mut tx, sale_id).await?;

        let terms = target
            .credit
            .as_mut()
            .ok_or_else(|| CoreError::NotCreditSale(sale_id.to_string()))?;
        terms.interest_waived = waive;

        let status = credit_status_of(&target, &payments, self.clock.today(), self.policy)?;
        if let Some(terms) = target.credit.as_mut() {
            terms.apply_status(&status);
            sale::update_credit_projection(&mut tx, sale_id, terms).await?;
        }
        tx.commit().await?;

        info!(sale_id = %sale_id, waive, total = %status.total_with_interest, "Interest waiver changed");
        Ok(status)
    }

    pub async fn payments(&self, sale_id: &str) -> LedgerResult<Vec<CreditPayment>> {
        self.credit_sale(sale_id).await?;
        Ok(self.db.credit_payments().list_for_sale(sale_id).await?)
    }

    /// Completed credit sales that are not paid yet, oldest first.
    pub async fn outstanding(&self) -> LedgerResult<Vec<CreditAccount>> {
        let today = self.clock.today();
        let open = self.db.sales().list_open_credit().await?;
        let repo = self.db.credit_payments();

        let mut accounts = Vec::new();
        for target in open {
            let payments = repo.list_for_sale(&target.id).await?;
            let status = credit_status_of(&target, &payments, today, self.policy)?;
            if !status.is_paid() {
                accounts.push(CreditAccount { sale: target, status });
            }
        }
        Ok(accounts)
    }

    async fn credit_sale(&self, sale_id: &str) -> LedgerResult<Sale> {
        let target = self
            .db
            .sales()
            .get(sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;
        if target.credit.is_none() {
            return Err(CoreError::NotCreditSale(sale_id.to_string()).into());
        }
        Ok(target)
    }
}
