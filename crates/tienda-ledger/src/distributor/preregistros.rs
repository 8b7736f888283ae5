//! Delivery allowances.

use tracing::{debug, info};

use tienda_core::distributor::{validate_delivery, DeliveryItem, Preregistro, PreregistroShortfall, PreregistroSource};
use tienda_core::validation::validate_delivery_items;
use tienda_db::repository::distributor as store;
use tienda_db::new_id;

use super::DistributorEngine;
use crate::error::{LedgerError, LedgerResult};

impl DistributorEngine {
    /// Files a manual allowance for a product.
    pub async fn add_preregistro(&self, distributor_id: &str, product_id: &str, quantity: i64) -> LedgerResult<Preregistro> {
        let item = DeliveryItem {
            product_id: product_id.to_string(),
            quantity,
        };
        validate_delivery_items(std::slice::from_ref(&item))?;

        let distributor = self.distributor(distributor_id).await?;
        if self.db.products().get(product_id).await?.is_none() {
            return Err(LedgerError::not_found("Product", product_id));
        }

        let pre = Preregistro {
            id: new_id(),
            distributor_id: distributor.id,
            product_id: item.product_id,
            quantity,
            source: PreregistroSource::Manual,
            reconciliation_id: None,
            created_at: self.clock.now(),
        };
        let mut conn = self.db.pool().acquire().await?;
        store::insert_preregistro(&mut conn, &pre).await?;

        info!(id = %pre.id, distributor_id = %pre.distributor_id, product_id = %pre.product_id, quantity, "Preregistro added");
        Ok(pre)
    }

    /// Every allowance on file, manual and carried.
    pub async fn preregistros(&self, distributor_id: &str) -> LedgerResult<Vec<Preregistro>> {
        self.distributor(distributor_id).await?;
        Ok(self.db.distributors().preregistros(distributor_id).await?)
    }

    /// Checks a delivery against the distributor's allowances.
    ///
    /// Returns the products that go over; an empty list means the delivery
    /// may be fulfilled. Nothing is consumed.
    pub async fn validate_delivery(
        &self,
        distributor_id: &str,
        items: &[DeliveryItem],
    ) -> LedgerResult<Vec<PreregistroShortfall>> {
        validate_delivery_items(items)?;
        let allowances = self.preregistros(distributor_id).await?;
        let shortfalls = validate_delivery(&allowances, items);
        debug!(
            distributor_id = %distributor_id,
            items = items.len(),
            shortfalls = shortfalls.len(),
            "Delivery checked against preregistros"
        );
        Ok(shortfalls)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::error::ErrorKind;
    use tienda_core::distributor::SaldoRestante;

    fn item(product_id: &str, quantity: i64) -> DeliveryItem {
        DeliveryItem {
            product_id: product_id.into(),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_delivery_within_allowance() {
        let h = harness().await;
        let leche = product(&h, "Leche 1L", 600, Some(450)).await;
        let pan = product(&h, "Pan molde", 900, None).await;
        let norte = h.wholesale.create_distributor("Distribuidora Norte").await.unwrap();

        h.wholesale.add_preregistro(&norte.id, &leche.id, 6).await.unwrap();
        h.wholesale.add_preregistro(&norte.id, &leche.id, 4).await.unwrap();

        let ok = h
            .wholesale
            .validate_delivery(&norte.id, &[item(&leche.id, 7), item(&leche.id, 3)])
            .await
            .unwrap();
        assert!(ok.is_empty());

        let short = h
            .wholesale
            .validate_delivery(&norte.id, &[item(&pan.id, 1), item(&leche.id, 11)])
            .await
            .unwrap();
        assert_eq!(short.len(), 2);
        assert_eq!(short[0].product_id, pan.id);
        assert_eq!(short[0].allowed, 0);
        assert_eq!(short[1].requested, 11);
        assert_eq!(short[1].allowed, 10);
    }

    #[tokio::test]
    async fn test_carried_allowance_replaced_on_close() {
        let h = harness().await;
        let leche = product(&h, "Leche 1L", 600, Some(450)).await;
        let norte = h.wholesale.create_distributor("Distribuidora Norte").await.unwrap();
        h.wholesale.add_preregistro(&norte.id, &leche.id, 2).await.unwrap();

        for remaining in [5, 3] {
            let rec = h.wholesale.open_reconciliation(&norte.id).await.unwrap();
            h.wholesale
                .close_reconciliation(
                    &rec.id,
                    vec![SaldoRestante {
                        product_id: leche.id.clone(),
                        remaining,
                    }],
                    0,
                )
                .await
                .unwrap();
        }

        // Manual 2 plus only the latest carry of 3
        let all = h.wholesale.preregistros(&norte.id).await.unwrap();
        assert_eq!(all.len(), 2);
        let short = h
            .wholesale
            .validate_delivery(&norte.id, &[item(&leche.id, 6)])
            .await
            .unwrap();
        assert_eq!(short[0].allowed, 5);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let h = harness().await;
        let leche = product(&h, "Leche 1L", 600, Some(450)).await;
        let norte = h.wholesale.create_distributor("Distribuidora Norte").await.unwrap();

        let err = h.wholesale.add_preregistro(&norte.id, &leche.id, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = h.wholesale.add_preregistro(&norte.id, "missing", 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = h
            .wholesale
            .validate_delivery(&norte.id, &[item(&leche.id, -2)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
