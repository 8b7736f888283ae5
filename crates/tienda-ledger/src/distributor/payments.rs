//! Distributor payments: an administrator checks the cash handed over for a
//! sale entry. `pending → verified`, and there is no way back.

use std::collections::HashSet;

use tracing::info;

use tienda_core::distributor::{DistributorPayment, PaymentState};
use tienda_core::validation::{validate_cash_amount, validate_reference};
use tienda_core::{CoreError, Money};
use tienda_db::repository::distributor as store;
use tienda_db::{new_id, DbError};

use super::DistributorEngine;
use crate::error::{LedgerError, LedgerResult};

impl DistributorEngine {
    /// Opens the payment for a sale entry, expecting its full total.
    ///
    /// A sale entry has at most one payment; a second one is a `Conflict`.
    pub async fn create_payment(&self, distributor_sale_id: &str) -> LedgerResult<DistributorPayment> {
        let entry = self.sale(distributor_sale_id).await?;

        let payment = DistributorPayment {
            id: new_id(),
            distributor_sale_id: entry.id.clone(),
            distributor_id: entry.distributor_id.clone(),
            expected_cents: entry.total_cents,
            received_cents: None,
            verified_by: None,
            verified_at: None,
            state: PaymentState::Pending,
            created_at: self.clock.now(),
        };
        let mut conn = self.db.pool().acquire().await?;
        store::insert_payment(&mut conn, &payment)
            .await
            .map_err(|e| match e {
                DbError::UniqueViolation { .. } => DbError::duplicate("payment for sale", entry.id.clone()),
                other => other,
            })?;

        info!(id = %payment.id, sale_id = %entry.id, expected = payment.expected_cents, "Distributor payment opened");
        Ok(payment)
    }

    /// Records what the administrator actually received.
    pub async fn verify_payment(
        &self,
        payment_id: &str,
        admin_id: &str,
        received_cents: i64,
    ) -> LedgerResult<DistributorPayment> {
        validate_reference("admin_id", admin_id)?;
        validate_cash_amount("received amount", received_cents)?;

        let mut tx = self.db.pool().begin().await?;
        let mut payment = store::get_payment(&mut tx, payment_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Payment", payment_id))?;
        let distributor = store::get_distributor(&mut tx, &payment.distributor_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Distributor", &payment.distributor_id))?;
        self.ensure_channel(&distributor.id, distributor.channel)?;

        payment.verify(admin_id, Money::from_cents(received_cents), self.clock.now())?;
        if !store::store_verification(&mut tx, &payment).await? {
            return Err(CoreError::InvalidTransition {
                entity: "Payment",
                id: payment.id.clone(),
                from: "verified".to_string(),
                to: "verified".to_string(),
            }
            .into());
        }
        tx.commit().await?;

        info!(
            id = %payment.id,
            admin_id = %admin_id,
            expected = payment.expected_cents,
            received = received_cents,
            difference = ?payment.difference().map(|d| d.cents()),
            "Distributor payment verified"
        );
        Ok(payment)
    }

    pub async fn payment(&self, payment_id: &str) -> LedgerResult<DistributorPayment> {
        let payment = self
            .db
            .distributors()
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Payment", payment_id))?;
        self.distributor(&payment.distributor_id).await?;
        Ok(payment)
    }

    /// Payments of this channel still waiting for an administrator.
    pub async fn pending_payments(&self) -> LedgerResult<Vec<DistributorPayment>> {
        let ours = self.channel_distributor_ids().await?;
        let pending = self.db.distributors().pending_payments().await?;
        Ok(pending
            .into_iter()
            .filter(|p| ours.contains(&p.distributor_id))
            .collect())
    }

    pub(super) async fn channel_distributor_ids(&self) -> LedgerResult<HashSet<String>> {
        Ok(self
            .list_distributors()
            .await?
            .into_iter()
            .map(|d| d.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::error::ErrorKind;
    use tienda_core::distributor::NewDistributorSale;

    async fn entry(h: &Harness, engine: &DistributorEngine, distributor_id: &str) -> String {
        let leche = product(h, &format!("Leche {}", engine.channel().as_str()), 600, Some(450)).await;
        engine
            .record_sale(NewDistributorSale {
                distributor_id: distributor_id.into(),
                product_id: leche.id,
                quantity_sold: 8,
                quantity_top_up: 2,
                unit_price_cents: None,
                order_id: Some("PED-0042".into()),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_verify_is_irreversible() {
        let h = harness().await;
        let norte = h.wholesale.create_distributor("Distribuidora Norte").await.unwrap();
        let sale_id = entry(&h, &h.wholesale, &norte.id).await;

        let payment = h.wholesale.create_payment(&sale_id).await.unwrap();
        assert_eq!(payment.expected_cents, 4_500);
        assert_eq!(payment.state, PaymentState::Pending);
        assert_eq!(h.wholesale.pending_payments().await.unwrap().len(), 1);

        h.clock.advance_days(1);
        let verified = h.wholesale.verify_payment(&payment.id, "admin", 4_000).await.unwrap();
        assert_eq!(verified.state, PaymentState::Verified);
        assert_eq!(verified.difference(), Some(Money::from_cents(-500)));
        assert_eq!(verified.verified_by.as_deref(), Some("admin"));
        assert_eq!(verified.verified_at.unwrap().date(), day(3));

        let err = h.wholesale.verify_payment(&payment.id, "admin", 4_500).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let stored = h.wholesale.payment(&payment.id).await.unwrap();
        assert_eq!(stored.received_cents, Some(4_000));
        assert!(h.wholesale.pending_payments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_payment_per_entry() {
        let h = harness().await;
        let norte = h.wholesale.create_distributor("Distribuidora Norte").await.unwrap();
        let sale_id = entry(&h, &h.wholesale, &norte.id).await;

        h.wholesale.create_payment(&sale_id).await.unwrap();
        let err = h.wholesale.create_payment(&sale_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = h.wholesale.create_payment("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = h.wholesale.verify_payment("missing", "admin", 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_pending_payments_per_channel() {
        let h = harness().await;
        let norte = h.wholesale.create_distributor("Distribuidora Norte").await.unwrap();
        let kiosko = h.retail.create_distributor("Kiosko Plaza").await.unwrap();
        let wholesale_sale = entry(&h, &h.wholesale, &norte.id).await;
        let retail_sale = entry(&h, &h.retail, &kiosko.id).await;

        h.wholesale.create_payment(&wholesale_sale).await.unwrap();
        let retail_payment = h.retail.create_payment(&retail_sale).await.unwrap();

        assert_eq!(h.wholesale.pending_payments().await.unwrap().len(), 1);
        assert_eq!(h.retail.pending_payments().await.unwrap().len(), 1);

        let err = h.wholesale.verify_payment(&retail_payment.id, "admin", 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
