//! # Distributor Settlement Engine
//!
//! Two tracks with the same shape, one engine instance per track:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  channel     period                     default price                   │
//! │  wholesale   open → close, any length   product wholesale (else unit)   │
//! │  retail      one per calendar day       product unit price              │
//! │                                                                         │
//! │  sale entries ──► claimed by a reconciliation when it closes            │
//! │                                                                         │
//! │  close(saldos) ──► saldos_restantes on the closed period                │
//! │                ──► opening_balances of the next period                  │
//! │                ──► carried preregistros (delivery allowances)           │
//! │                                                                         │
//! │  payments:  pending → verified          (no way back)                   │
//! │  notices:   pending → seen → resolved   (pending → resolved allowed)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An engine only touches distributors of its own channel; asking the
//! wholesale engine about a retail distributor is a validation error.

mod notifications;
mod payments;
mod preregistros;
mod reconciliation;
mod sales;

use std::sync::Arc;

use tracing::info;

use tienda_core::distributor::{Channel, Distributor};
use tienda_core::validation::validate_reference;
use tienda_core::ValidationError;
use tienda_db::repository::distributor as store;
use tienda_db::{new_id, Database, DbError};

use crate::clock::Clock;
use crate::error::{LedgerError, LedgerResult};

/// Settlement engine for one distributor channel.
#[derive(Debug, Clone)]
pub struct DistributorEngine {
    db: Database,
    clock: Arc<dyn Clock>,
    channel: Channel,
}

impl DistributorEngine {
    pub fn new(db: Database, clock: Arc<dyn Clock>, channel: Channel) -> Self {
        DistributorEngine { db, clock, channel }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Registers a distributor on this engine's channel.
    ///
    /// Names are unique per channel.
    pub async fn create_distributor(&self, name: &str) -> LedgerResult<Distributor> {
        validate_reference("name", name)?;

        let created = Distributor {
            id: new_id(),
            name: name.trim().to_string(),
            channel: self.channel,
            active: true,
            created_at: self.clock.now(),
        };
        let mut conn = self.db.pool().acquire().await?;
        store::insert_distributor(&mut conn, &created)
            .await
            .map_err(|e| match e {
                DbError::UniqueViolation { .. } => DbError::duplicate("distributor name", created.name.clone()),
                other => other,
            })?;

        info!(id = %created.id, name = %created.name, channel = self.channel.as_str(), "Distributor created");
        Ok(created)
    }

    /// A distributor of this channel.
    pub async fn distributor(&self, distributor_id: &str) -> LedgerResult<Distributor> {
        let found = self
            .db
            .distributors()
            .get(distributor_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Distributor", distributor_id))?;
        self.ensure_channel(&found.id, found.channel)?;
        Ok(found)
    }

    pub async fn list_distributors(&self) -> LedgerResult<Vec<Distributor>> {
        Ok(self.db.distributors().list(self.channel).await?)
    }

    fn ensure_channel(&self, id: &str, channel: Channel) -> LedgerResult<()> {
        if channel != self.channel {
            return Err(ValidationError::NotAllowed {
                field: "distributor_id".to_string(),
                reason: format!(
                    "{id} is a {} distributor; this engine handles {}",
                    channel.as_str(),
                    self.channel.as_str()
                ),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::FixedClock;
    use crate::stock::StockLedger;
    use chrono::NaiveDate;
    use tienda_core::{NewProduct, Product};
    use tienda_db::DbConfig;

    pub(crate) struct Harness {
        pub wholesale: DistributorEngine,
        pub retail: DistributorEngine,
        pub stock: StockLedger,
        pub clock: Arc<FixedClock>,
        pub db: Database,
    }

    pub(crate) fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    pub(crate) async fn harness() -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(FixedClock::at(day(2).and_hms_opt(7, 45, 0).unwrap()));
        Harness {
            wholesale: DistributorEngine::new(db.clone(), clock.clone(), Channel::Wholesale),
            retail: DistributorEngine::new(db.clone(), clock.clone(), Channel::Retail),
            stock: StockLedger::new(db.clone(), clock.clone()),
            clock,
            db,
        }
    }

    pub(crate) async fn product(h: &Harness, name: &str, unit: i64, wholesale: Option<i64>) -> Product {
        h.stock
            .create_product(
                NewProduct {
                    name: name.into(),
                    unit_price_cents: unit,
                    wholesale_price_cents: wholesale,
                    initial_stock: 100,
                    min_stock: 10,
                },
                "admin",
            )
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_names_unique_per_channel() {
        let h = harness().await;
        h.wholesale.create_distributor("Distribuidora Norte").await.unwrap();
        let err = h.wholesale.create_distributor("Distribuidora Norte").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Same name on the other channel is a different distributor
        h.retail.create_distributor("Distribuidora Norte").await.unwrap();
        assert_eq!(h.wholesale.list_distributors().await.unwrap().len(), 1);
        assert_eq!(h.retail.list_distributors().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_rejects_other_channel() {
        let h = harness().await;
        let kiosk = h.retail.create_distributor("Kiosko Plaza").await.unwrap();

        let err = h.wholesale.distributor(&kiosk.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.retail.distributor(&kiosk.id).await.unwrap().name, "Kiosko Plaza");

        let err = h.retail.distributor("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
