//! # Ticket Lines
//!
//! A ticket can be printed from three different sources. Each one is its
//! own variant, so renderers match on the source instead of probing fields.
//!
//! ```text
//! TicketLine::Sale         ← SaleDetail of a committed sale
//! TicketLine::Cart         ← CartLine still in the cart (preview)
//! TicketLine::Distributor  ← DistributorSale ledger entry
//! ```

use serde::{Deserialize, Serialize};

use crate::distributor::DistributorSale;
use crate::money::Money;
use crate::types::SaleDetail;

/// An item in the cart before the sale is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TicketLine {
    Sale { detail: SaleDetail, name: String },
    Cart(CartLine),
    Distributor { entry: DistributorSale, name: String },
}

impl TicketLine {
    pub fn description(&self) -> &str {
        match self {
            TicketLine::Sale { name, .. } => name,
            TicketLine::Cart(line) => &line.name,
            TicketLine::Distributor { name, .. } => name,
        }
    }

    pub fn product_id(&self) -> &str {
        match self {
            TicketLine::Sale { detail, .. } => &detail.product_id,
            TicketLine::Cart(line) => &line.product_id,
            TicketLine::Distributor { entry, .. } => &entry.product_id,
        }
    }

    /// Billed quantity. Distributor top-ups count.
    pub fn quantity(&self) -> i64 {
        match self {
            TicketLine::Sale { detail, .. } => detail.quantity,
            TicketLine::Cart(line) => line.quantity,
            TicketLine::Distributor { entry, .. } => entry.delivered_quantity(),
        }
    }

    pub fn unit_price(&self) -> Money {
        match self {
            TicketLine::Sale { detail, .. } => detail.unit_price(),
            TicketLine::Cart(line) => Money::from_cents(line.unit_price_cents),
            TicketLine::Distributor { entry, .. } => entry.unit_price(),
        }
    }

    /// Stored subtotal where one exists, computed for cart lines.
    pub fn subtotal(&self) -> Money {
        match self {
            TicketLine::Sale { detail, .. } => detail.subtotal(),
            TicketLine::Cart(line) => Money::from_cents(line.unit_price_cents).multiply_quantity(line.quantity),
            TicketLine::Distributor { entry, .. } => entry.total(),
        }
    }
}

/// Sum of line subtotals.
pub fn ticket_total(lines: &[TicketLine]) -> Money {
    lines.iter().map(TicketLine::subtotal).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributor::Channel;
    use chrono::{NaiveDate, NaiveTime};

    #[test]
    fn test_uniform_accessors_across_sources() {
        let lines = vec![
            TicketLine::Sale {
                detail: SaleDetail {
                    id: "d-1".into(),
                    sale_id: "s-1".into(),
                    product_id: "p-1".into(),
                    quantity: 2,
                    unit_price_cents: 1_250,
                    subtotal_cents: 2_500,
                },
                name: "Leche".into(),
            },
            TicketLine::Cart(CartLine {
                product_id: "p-2".into(),
                name: "Pan".into(),
                quantity: 3,
                unit_price_cents: 100,
            }),
            TicketLine::Distributor {
                entry: DistributorSale {
                    id: "ds-1".into(),
                    distributor_id: "dist".into(),
                    channel: Channel::Wholesale,
                    product_id: "p-3".into(),
                    quantity_sold: 10,
                    quantity_top_up: 2,
                    unit_price_cents: 450,
                    total_cents: 5_400,
                    sale_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                    sale_time: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
                    order_id: None,
                    reconciliation_id: None,
                },
                name: "Gaseosa".into(),
            },
        ];

        assert_eq!(lines[1].description(), "Pan");
        assert_eq!(lines[1].subtotal().cents(), 300);
        assert_eq!(lines[2].quantity(), 12);
        assert_eq!(lines[2].product_id(), "p-3");
        assert_eq!(ticket_total(&lines).cents(), 8_200);
    }
}
