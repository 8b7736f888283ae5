//! Distributor sale entries (ventas mayoristas / minoristas).

use chrono::NaiveDate;
use tracing::info;

use tienda_core::distributor::{distributor_sale_total, resolve_price, DistributorSale, NewDistributorSale};
use tienda_core::ticket::TicketLine;
use tienda_core::validation::validate_distributor_sale;
use tienda_core::ValidationError;
use tienda_db::repository::distributor as store;
use tienda_db::new_id;

use super::DistributorEngine;
use crate::clock::minute_of;
use crate::error::{LedgerError, LedgerResult};

impl DistributorEngine {
    /// Records a ledger entry for a distributor.
    ///
    /// The total is always `(sold + top-up) × price`, computed here. Stock
    /// is not touched: the entry records what the distributor moved, not
    /// what left this store's shelves.
    pub async fn record_sale(&self, input: NewDistributorSale) -> LedgerResult<DistributorSale> {
        validate_distributor_sale(&input)?;

        let distributor = self.distributor(&input.distributor_id).await?;
        if !distributor.active {
            return Err(ValidationError::NotAllowed {
                field: "distributor_id".to_string(),
                reason: format!("distributor {} is inactive", distributor.name),
            }
            .into());
        }
        let product = self
            .db
            .products()
            .get(&input.product_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Product", &input.product_id))?;

        let price = resolve_price(self.channel, &product, input.unit_price_cents);
        let total = distributor_sale_total(input.quantity_sold, input.quantity_top_up, price);
        let now = self.clock.now();

        let entry = DistributorSale {
            id: new_id(),
            distributor_id: distributor.id,
            channel: self.channel,
            product_id: product.id,
            quantity_sold: input.quantity_sold,
            quantity_top_up: input.quantity_top_up,
            unit_price_cents: price.cents(),
            total_cents: total.cents(),
            sale_date: now.date(),
            sale_time: minute_of(now),
            order_id: input.order_id,
            reconciliation_id: None,
        };
        let mut conn = self.db.pool().acquire().await?;
        store::insert_sale(&mut conn, &entry, now).await?;

        info!(
            id = %entry.id,
            distributor_id = %entry.distributor_id,
            channel = self.channel.as_str(),
            total = %entry.total(),
            "Distributor sale recorded"
        );
        Ok(entry)
    }

    pub async fn sale(&self, sale_id: &str) -> LedgerResult<DistributorSale> {
        let entry = self
            .db
            .distributors()
            .get_sale(sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Distributor sale", sale_id))?;
        self.ensure_channel(&entry.distributor_id, entry.channel)?;
        Ok(entry)
    }

    /// Entries between two dates, inclusive.
    pub async fn list_sales(
        &self,
        distributor_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<Vec<DistributorSale>> {
        self.distributor(distributor_id).await?;
        Ok(self.db.distributors().list_sales(distributor_id, from, to).await?)
    }

    /// Printable lines for a distributor statement.
    pub async fn statement(
        &self,
        distributor_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<Vec<TicketLine>> {
        let entries = self.list_sales(distributor_id, from, to).await?;
        let products = self.db.products();
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = match products.get(&entry.product_id).await? {
                Some(p) => p.name,
                None => entry.product_id.clone(),
            };
            lines.push(TicketLine::Distributor { entry, name });
        }
        Ok(lines)
    }
}
