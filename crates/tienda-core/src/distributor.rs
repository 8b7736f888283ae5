//! # Distributor Settlement
//!
//! Types and pure rules for distributor ledgers: the wholesale (mayorista)
//! and retail (minorista) tracks share one shape and differ only in
//! their reconciliation cycle.
//!
//! ## Carry-Forward
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   Period N (open)                 Period N (closed)                     │
//! │   opening_balances ◄── N-1 saldos  saldos_restantes ──┐                 │
//! │                                                       │                 │
//! │                                                       ▼                 │
//! │   Period N+1 (open)               carried preregistros                  │
//! │   opening_balances ◄── N saldos   (allowances for the next deliveries) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycles
//! ```text
//! Reconciliation:  Open ──► Closed
//! Payment:         Pending ──► Verified          (no way back)
//! Notice:          Pending ──► Seen ──► Resolved
//!                     └─────────────────┘
//! ```

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::Product;

// =============================================================================
// Channel & Distributor
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Mayorista: arbitrary reconciliation period, wholesale prices.
    Wholesale,
    /// Minorista: one reconciliation per day, retail prices.
    Retail,
}

impl Channel {
    /// Retail distributors reconcile once per calendar day.
    #[inline]
    pub fn is_daily(&self) -> bool {
        matches!(self, Channel::Retail)
    }

    /// Price a distributor on this channel pays when none is given.
    pub fn default_price(&self, product: &Product) -> Money {
        match self {
            Channel::Wholesale => product.wholesale_price(),
            Channel::Retail => product.unit_price(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Wholesale => "wholesale",
            Channel::Retail => "retail",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Distributor {
    pub id: String,
    pub name: String,
    pub channel: Channel,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

// =============================================================================
// Distributor Sale
// =============================================================================

/// A periodic ledger entry for a distributor. Not a retail `Sale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorSale {
    pub id: String,
    pub distributor_id: String,
    pub channel: Channel,
    pub product_id: String,
    pub quantity_sold: i64,
    /// Aumento: replenishment handed over, billed but not a sale.
    pub quantity_top_up: i64,
    pub unit_price_cents: i64,
    /// (sold + top-up) × price, computed at write time.
    pub total_cents: i64,
    pub sale_date: NaiveDate,
    pub sale_time: NaiveTime,
    pub order_id: Option<String>,
    /// Reconciliation that accounted for this entry, once closed.
    pub reconciliation_id: Option<String>,
}

impl DistributorSale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn delivered_quantity(&self) -> i64 {
        self.quantity_sold + self.quantity_top_up
    }
}

/// Input for recording a distributor sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDistributorSale {
    pub distributor_id: String,
    pub product_id: String,
    pub quantity_sold: i64,
    #[serde(default)]
    pub quantity_top_up: i64,
    /// Overrides the channel's default price.
    pub unit_price_cents: Option<i64>,
    pub order_id: Option<String>,
}

/// Total billed for a distributor entry: top-ups are charged like sales.
///
/// ## Example
/// ```rust
/// use tienda_core::distributor::distributor_sale_total;
/// use tienda_core::money::Money;
///
/// let total = distributor_sale_total(10, 2, Money::from_cents(450));
/// assert_eq!(total.cents(), 5_400);
/// ```
pub fn distributor_sale_total(quantity_sold: i64, quantity_top_up: i64, price: Money) -> Money {
    price.multiply_quantity(quantity_sold + quantity_top_up)
}

/// Explicit price, else the channel default for the product.
pub fn resolve_price(channel: Channel, product: &Product, explicit_cents: Option<i64>) -> Money {
    match explicit_cents {
        Some(cents) => Money::from_cents(cents),
        None => channel.default_price(product),
    }
}

// =============================================================================
// Saldos Restantes
// =============================================================================

/// Remaining quantity of one product at the end of a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaldoRestante {
    pub product_id: String,
    pub remaining: i64,
}

/// Checks a saldos list before it is stored.
///
/// Order is preserved. Negative quantities and a product listed twice are
/// rejected; entries with zero remaining are dropped.
pub fn normalize_saldos(saldos: Vec<SaldoRestante>) -> Result<Vec<SaldoRestante>, ValidationError> {
    let mut seen = HashSet::with_capacity(saldos.len());
    let mut out = Vec::with_capacity(saldos.len());
    for saldo in saldos {
        if saldo.remaining < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: format!("saldo for {}", saldo.product_id),
            });
        }
        if !seen.insert(saldo.product_id.clone()) {
            return Err(ValidationError::Duplicate {
                field: "saldo product".to_string(),
                value: saldo.product_id,
            });
        }
        if saldo.remaining > 0 {
            out.push(saldo);
        }
    }
    Ok(out)
}

// =============================================================================
// Reconciliation (arqueo de distribuidor)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    pub id: String,
    pub distributor_id: String,
    pub channel: Channel,
    pub period_start: NaiveDate,
    /// Equal to `period_start` for retail; set at close for wholesale.
    pub period_end: Option<NaiveDate>,
    pub opened_at: NaiveTime,
    pub closed_at: Option<NaiveTime>,
    /// Saldos carried in from the previous closed period.
    pub opening_balances: Vec<SaldoRestante>,
    pub saldos_restantes: Vec<SaldoRestante>,
    pub sales_total_cents: i64,
    pub quantity_sold: i64,
    pub cash_received_cents: Option<i64>,
    /// cash received − sales total.
    pub cash_difference_cents: Option<i64>,
    pub state: ReconciliationState,
}

/// Aggregate of the distributor sales a reconciliation accounts for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSales {
    pub entries: i64,
    pub quantity_sold: i64,
    pub total: Money,
}

impl Reconciliation {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.state == ReconciliationState::Open
    }

    /// Applies the close transition.
    pub fn close(
        &mut self,
        on: NaiveDate,
        at: NaiveTime,
        sales: PeriodSales,
        saldos: Vec<SaldoRestante>,
        cash_received: Money,
    ) -> CoreResult<()> {
        if !self.is_open() {
            return Err(CoreError::InvalidTransition {
                entity: "Reconciliation",
                id: self.id.clone(),
                from: "closed".to_string(),
                to: "closed".to_string(),
            });
        }
        self.period_end = Some(on);
        self.closed_at = Some(at);
        self.sales_total_cents = sales.total.cents();
        self.quantity_sold = sales.quantity_sold;
        self.saldos_restantes = saldos;
        self.cash_received_cents = Some(cash_received.cents());
        self.cash_difference_cents = Some((cash_received - sales.total).cents());
        self.state = ReconciliationState::Closed;
        Ok(())
    }
}

// =============================================================================
// Preregistros
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PreregistroSource {
    /// Entered by an administrator.
    Manual,
    /// Produced from the saldos of a closed reconciliation.
    Carry,
}

/// Pre-authorized product allowance for a distributor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Preregistro {
    pub id: String,
    pub distributor_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub source: PreregistroSource,
    pub reconciliation_id: Option<String>,
    pub created_at: NaiveDateTime,
}

/// One product line of a delivery or order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryItem {
    pub product_id: String,
    pub quantity: i64,
}

/// A delivery line not covered by the distributor's preregistros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreregistroShortfall {
    pub product_id: String,
    pub requested: i64,
    pub allowed: i64,
}

/// Checks a delivery against the allowances on file.
///
/// Allowances and requested quantities are summed per product. The result
/// lists every product whose request exceeds its allowance, in the order
/// the products first appear in `items`; empty means the delivery may go.
pub fn validate_delivery(allowances: &[Preregistro], items: &[DeliveryItem]) -> Vec<PreregistroShortfall> {
    let mut allowed: HashMap<&str, i64> = HashMap::new();
    for pre in allowances {
        *allowed.entry(pre.product_id.as_str()).or_default() += pre.quantity;
    }

    let mut order: Vec<&str> = Vec::new();
    let mut requested: HashMap<&str, i64> = HashMap::new();
    for item in items {
        let entry = requested.entry(item.product_id.as_str()).or_insert_with(|| {
            order.push(item.product_id.as_str());
            0
        });
        *entry += item.quantity;
    }

    order
        .into_iter()
        .filter_map(|product_id| {
            let wanted = requested.get(product_id).copied().unwrap_or(0);
            let cap = allowed.get(product_id).copied().unwrap_or(0);
            (wanted > cap).then(|| PreregistroShortfall {
                product_id: product_id.to_string(),
                requested: wanted,
                allowed: cap,
            })
        })
        .collect()
}

// =============================================================================
// Distributor Payment (pago mayorista)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Verified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DistributorPayment {
    pub id: String,
    pub distributor_sale_id: String,
    pub distributor_id: String,
    pub expected_cents: i64,
    pub received_cents: Option<i64>,
    pub verified_by: Option<String>,
    pub verified_at: Option<NaiveDateTime>,
    pub state: PaymentState,
    pub created_at: NaiveDateTime,
}

impl DistributorPayment {
    /// received − expected, once verified.
    pub fn difference(&self) -> Option<Money> {
        self.received_cents
            .map(|received| Money::from_cents(received - self.expected_cents))
    }

    /// Pending → Verified. There is no reverse transition.
    pub fn verify(&mut self, admin_id: &str, received: Money, at: NaiveDateTime) -> CoreResult<()> {
        if self.state == PaymentState::Verified {
            return Err(CoreError::InvalidTransition {
                entity: "Payment",
                id: self.id.clone(),
                from: "verified".to_string(),
                to: "verified".to_string(),
            });
        }
        self.received_cents = Some(received.cents());
        self.verified_by = Some(admin_id.to_string());
        self.verified_at = Some(at);
        self.state = PaymentState::Verified;
        Ok(())
    }
}

// =============================================================================
// Reconciliation Notice (notificación de arqueo)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum NoticeState {
    Pending,
    Seen,
    Resolved,
}

impl NoticeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeState::Pending => "pending",
            NoticeState::Seen => "seen",
            NoticeState::Resolved => "resolved",
        }
    }

    pub fn can_move_to(&self, next: NoticeState) -> bool {
        matches!(
            (self, next),
            (NoticeState::Pending, NoticeState::Seen)
                | (NoticeState::Pending, NoticeState::Resolved)
                | (NoticeState::Seen, NoticeState::Resolved)
        )
    }
}

/// Alert that a distributor has gone too long without reconciling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReconciliationNotice {
    pub id: String,
    pub distributor_id: String,
    pub days_without_reconciliation: i64,
    pub state: NoticeState,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ReconciliationNotice {
    pub fn transition(&mut self, next: NoticeState, at: NaiveDateTime) -> CoreResult<()> {
        if !self.state.can_move_to(next) {
            return Err(CoreError::InvalidTransition {
                entity: "Notice",
                id: self.id.clone(),
                from: self.state.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.state = next;
        self.updated_at = at;
        Ok(())
    }
}

/// Days since the last closed reconciliation; `None` if there never was one.
pub fn days_since(last_closed: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    last_closed.map(|day| (today - day).num_days().max(0))
}

// =============================================================================
// Unit Tests
// =============================================================================
