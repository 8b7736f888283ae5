//! # Domain Types
//!
//! Core domain types used throughout Tienda POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │  CreditPayment  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name (unique)  │   │  date + time    │   │  sale_id (FK)   │       │
//! │  │  current_stock  │   │  state          │   │  amount_cents   │       │
//! │  │  unit_price     │   │  credit: Option │   │  installment    │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │ owns                                  │
//! │                        ┌────────▼────────┐   ┌─────────────────┐       │
//! │                        │   SaleDetail    │   │  CashRegister   │       │
//! │                        │  qty × price    │   │  open → closed  │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────┐      │
//! │  │ InventoryMovement: append-only, current_stock is its cache   │      │
//! │  └──────────────────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Naive Local Time
//! Dates and times are captured at the call site in local wall-clock time
//! and stored exactly as captured. No type here carries a timezone.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Interest Rate
// =============================================================================

/// Monthly interest rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 500 bps = 5% per month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterestRate(u32);

impl InterestRate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        InterestRate(bps)
    }

    /// Creates a rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        InterestRate((pct * 100.0).round().max(0.0) as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        InterestRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for InterestRate {
    fn default() -> Self {
        InterestRate::zero()
    }
}

// =============================================================================
// Product
// =============================================================================

/// Lifecycle of a catalogue entry. Inactive products cannot be sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ProductState {
    Active,
    Inactive,
}

/// A product available for sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, unique across the catalogue.
    pub name: String,

    /// Retail price in cents.
    pub unit_price_cents: i64,

    /// Price charged to wholesale distributors, when it differs.
    pub wholesale_price_cents: Option<i64>,

    /// Quantity on hand. Cached projection of the movement ledger.
    pub current_stock: i64,

    /// Threshold for the low-stock report.
    pub min_stock: i64,

    pub state: ProductState,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Product {
    /// Returns the retail price as a Money type.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Wholesale price, falling back to the retail price.
    #[inline]
    pub fn wholesale_price(&self) -> Money {
        Money::from_cents(self.wholesale_price_cents.unwrap_or(self.unit_price_cents))
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == ProductState::Active
    }

    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.min_stock
    }

    /// Checks that `quantity` units can be sold right now.
    ///
    /// An inactive product reports zero available units, so the caller
    /// sees the same `InsufficientStock` shape either way.
    pub fn ensure_can_sell(&self, quantity: i64) -> CoreResult<()> {
        let available = if self.is_active() { self.current_stock } else { 0 };
        if available >= quantity {
            return Ok(());
        }
        Err(CoreError::InsufficientStock {
            product_id: self.id.clone(),
            available,
            requested: quantity,
        })
    }
}

/// Input for creating a catalogue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub unit_price_cents: i64,
    pub wholesale_price_cents: Option<i64>,
    pub initial_stock: i64,
    pub min_stock: i64,
}

/// Result of comparing the cached stock with the movement ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReconciliation {
    /// `current_stock` as stored on the product row.
    pub cached: i64,
    /// Signed sum of the product's movements.
    pub ledger: i64,
    pub consistent: bool,
}

impl StockReconciliation {
    pub fn new(cached: i64, ledger: i64) -> Self {
        Self {
            cached,
            ledger,
            consistent: cached == ledger,
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// QR wallet payment.
    Qr,
    /// Bank transfer.
    Transfer,
    /// Installment credit. The only method that carries credit terms.
    Credit,
}

impl PaymentMethod {
    #[inline]
    pub fn is_credit(&self) -> bool {
        matches!(self, PaymentMethod::Credit)
    }

    /// Whether a completed sale with this method feeds the register total.
    #[inline]
    pub fn feeds_register(&self) -> bool {
        !self.is_credit()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Qr => "qr",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Credit => "credit",
        }
    }
}

// =============================================================================
// Sale State
// =============================================================================

/// `{none} → Completed → Voided`. Voided is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleState {
    Completed,
    Voided,
}

/// Settlement state of a credit sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CreditState {
    Pending,
    Partial,
    Paid,
    Overdue,
}

// =============================================================================
// Credit Terms
// =============================================================================

/// Credit-specific part of a sale.
///
/// Lives inside `Sale::credit`, which is `None` for every non-credit sale,
/// so a cash sale cannot carry installment fields by construction.
///
/// The `*_cents` projection fields and `state` are advisory: they are
/// refreshed on every payment, but readers recompute them with
/// [`crate::credit::compute_credit_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTerms {
    pub installments: u32,
    /// Sale date plus `installments` months.
    pub due_date: NaiveDate,
    pub monthly_rate: InterestRate,
    pub down_payment_cents: i64,
    pub interest_waived: bool,

    pub amount_paid_cents: i64,
    pub pending_balance_cents: i64,
    pub accrued_interest_cents: i64,
    pub total_with_interest_cents: i64,
    pub state: CreditState,
}

impl CreditTerms {
    #[inline]
    pub fn down_payment(&self) -> Money {
        Money::from_cents(self.down_payment_cents)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A retail sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    pub sale_date: NaiveDate,
    pub sale_time: NaiveTime,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub client_id: Option<String>,
    pub seller_id: String,
    pub state: SaleState,
    pub credit: Option<CreditTerms>,
    /// Set when the sale is voided.
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn is_voided(&self) -> bool {
        self.state == SaleState::Voided
    }

    /// Checks the cancellation rules: not already voided, and same day.
    ///
    /// ## Example
    /// ```text
    /// sale_date = 2026-03-01, today = 2026-03-01  → Ok
    /// sale_date = 2026-03-01, today = 2026-03-02  → StaleCancellation
    /// state = Voided                              → AlreadyVoided
    /// ```
    pub fn ensure_cancellable(&self, today: NaiveDate) -> CoreResult<()> {
        if self.is_voided() {
            return Err(CoreError::AlreadyVoided(self.id.clone()));
        }
        if self.sale_date != today {
            return Err(CoreError::StaleCancellation {
                sale_id: self.id.clone(),
                sale_date: self.sale_date,
                today,
            });
        }
        Ok(())
    }
}

/// A sale together with its line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleWithDetails {
    pub sale: Sale,
    pub details: Vec<SaleDetail>,
}

/// Input line for a new sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl NewSaleItem {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// Credit terms requested when the payment method is credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditRequest {
    pub installments: u32,
    pub monthly_rate: InterestRate,
    #[serde(default)]
    pub down_payment_cents: i64,
}

/// Input for the sale engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSale {
    pub payment_method: PaymentMethod,
    pub client_id: Option<String>,
    pub seller_id: String,
    pub items: Vec<NewSaleItem>,
    pub credit: Option<CreditRequest>,
}

impl NewSale {
    /// Sum of line subtotals.
    pub fn total(&self) -> Money {
        self.items.iter().map(NewSaleItem::subtotal).sum()
    }
}

// =============================================================================
// Sale Detail
// =============================================================================

/// A line item in a sale. Created in the same transaction as its sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleDetail {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// quantity × unit price.
    pub subtotal_cents: i64,
}

impl SaleDetail {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }
}

// =============================================================================
// Credit Payment
// =============================================================================

/// A payment against a credit sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CreditPayment {
    pub id: String,
    pub sale_id: String,
    pub amount_cents: i64,
    pub payment_date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub installment_number: Option<i64>,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
}

impl CreditPayment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Input for recording a credit payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCreditPayment {
    pub amount_cents: i64,
    pub payment_method: PaymentMethod,
    pub installment_number: Option<i64>,
    pub note: Option<String>,
}

// =============================================================================
// Cash Register
// =============================================================================

/// `{none} → Open → Closed`. A closed register is never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum RegisterState {
    Open,
    Closed,
}

/// One register session (arqueo de caja).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashRegister {
    pub id: String,
    pub business_date: NaiveDate,
    pub opened_at: NaiveTime,
    pub closed_at: Option<NaiveTime>,
    pub opening_cents: i64,
    /// Running sum of non-credit completed sales for the date.
    pub total_sales_cents: i64,
    pub counted_cash_cents: Option<i64>,
    pub difference_cents: Option<i64>,
    pub admin_id: String,
    pub note: Option<String>,
    pub state: RegisterState,
}

impl CashRegister {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.state == RegisterState::Open
    }

    /// Cash the drawer should hold: opening amount plus sales.
    #[inline]
    pub fn expected_cash(&self) -> Money {
        Money::from_cents(self.opening_cents + self.total_sales_cents)
    }

    /// Applies the close transition.
    ///
    /// `difference = counted − (opening + total_sales)`; a negative value
    /// means the drawer is short.
    pub fn close(&mut self, counted: Money, at: NaiveTime, note: Option<String>) -> CoreResult<()> {
        if !self.is_open() {
            return Err(CoreError::InvalidTransition {
                entity: "Register",
                id: self.id.clone(),
                from: "closed".to_string(),
                to: "closed".to_string(),
            });
        }
        self.closed_at = Some(at);
        self.counted_cash_cents = Some(counted.cents());
        self.difference_cents = Some((counted - self.expected_cash()).cents());
        self.note = note;
        self.state = RegisterState::Closed;
        Ok(())
    }
}

// =============================================================================
// Inventory Movement
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    /// Direction for a stock delta. Zero has no movement.
    pub fn from_delta(delta: i64) -> Option<Self> {
        match delta {
            d if d > 0 => Some(MovementDirection::In),
            d if d < 0 => Some(MovementDirection::Out),
            _ => None,
        }
    }

    #[inline]
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            MovementDirection::In => quantity,
            MovementDirection::Out => -quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    Sale,
    Adjustment,
    Purchase,
    Return,
}

/// One append-only entry of the stock ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryMovement {
    pub id: String,
    pub product_id: String,
    pub direction: MovementDirection,
    /// Always > 0; the sign comes from `direction`.
    pub quantity: i64,
    pub reason: MovementReason,
    pub recorded_at: NaiveDateTime,
    pub user_id: String,
    pub note: Option<String>,
    pub sale_id: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
}

impl InventoryMovement {
    #[inline]
    pub fn signed_quantity(&self) -> i64 {
        self.direction.signed(self.quantity)
    }
}

/// Input for appending a movement.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: String,
    pub direction: MovementDirection,
    pub quantity: i64,
    pub reason: MovementReason,
    pub recorded_at: NaiveDateTime,
    pub user_id: String,
    pub note: Option<String>,
    pub sale_id: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn product(stock: i64, state: ProductState) -> Product {
        let at = date(2026, 1, 1).and_hms_opt(9, 0, 0).unwrap();
        Product {
            id: "p-1".to_string(),
            name: "Arroz 1kg".to_string(),
            unit_price_cents: 850,
            wholesale_price_cents: None,
            current_stock: stock,
            min_stock: 2,
            state,
            created_at: at,
            updated_at: at,
        }
    }

    fn cash_sale(day: NaiveDate, state: SaleState) -> Sale {
        Sale {
            id: "s-1".to_string(),
            sale_date: day,
            sale_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            total_cents: 5_000,
            payment_method: PaymentMethod::Cash,
            client_id: None,
            seller_id: "u-1".to_string(),
            state,
            credit: None,
            cancelled_by: None,
            cancellation_reason: None,
        }
    }

    #[test]
    fn test_interest_rate_from_percentage() {
        assert_eq!(InterestRate::from_percentage(5.0).bps(), 500);
        assert_eq!(InterestRate::from_percentage(2.75).bps(), 275);
        assert!((InterestRate::from_bps(500).percentage() - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_can_sell_exact_stock() {
        assert!(product(10, ProductState::Active).ensure_can_sell(10).is_ok());

        let err = product(10, ProductState::Active).ensure_can_sell(11).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 10, requested: 11, .. }
        ));
    }

    #[test]
    fn test_inactive_product_has_nothing_available() {
        let err = product(10, ProductState::Inactive).ensure_can_sell(1).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 0, requested: 1, .. }
        ));
    }

    #[test]
    fn test_wholesale_price_falls_back_to_unit_price() {
        let mut p = product(1, ProductState::Active);
        assert_eq!(p.wholesale_price().cents(), 850);
        p.wholesale_price_cents = Some(700);
        assert_eq!(p.wholesale_price().cents(), 700);
    }

    #[test]
    fn test_cancellable_same_day_only() {
        let today = date(2026, 3, 1);
        assert!(cash_sale(today, SaleState::Completed).ensure_cancellable(today).is_ok());

        let err = cash_sale(date(2026, 2, 28), SaleState::Completed)
            .ensure_cancellable(today)
            .unwrap_err();
        assert!(matches!(err, CoreError::StaleCancellation { .. }));

        let err = cash_sale(today, SaleState::Voided)
            .ensure_cancellable(today)
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyVoided(_)));
    }

    #[test]
    fn test_register_close_computes_difference() {
        let mut register = CashRegister {
            id: "r-1".to_string(),
            business_date: date(2026, 3, 1),
            opened_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            closed_at: None,
            opening_cents: 10_000,
            total_sales_cents: 15_000,
            counted_cash_cents: None,
            difference_cents: None,
            admin_id: "admin".to_string(),
            note: None,
            state: RegisterState::Open,
        };

        register
            .close(Money::from_cents(24_500), NaiveTime::from_hms_opt(20, 0, 0).unwrap(), None)
            .unwrap();
        assert_eq!(register.difference_cents, Some(-500));
        assert_eq!(register.state, RegisterState::Closed);

        assert!(register
            .close(Money::from_cents(0), NaiveTime::from_hms_opt(21, 0, 0).unwrap(), None)
            .is_err());
    }

    #[test]
    fn test_movement_direction_from_delta() {
        assert_eq!(MovementDirection::from_delta(3), Some(MovementDirection::In));
        assert_eq!(MovementDirection::from_delta(-2), Some(MovementDirection::Out));
        assert_eq!(MovementDirection::from_delta(0), None);
        assert_eq!(MovementDirection::Out.signed(4), -4);
    }

    #[test]
    fn test_new_sale_total() {
        let sale = NewSale {
            payment_method: PaymentMethod::Cash,
            client_id: None,
            seller_id: "u-1".to_string(),
            items: vec![
                NewSaleItem { product_id: "a".into(), quantity: 2, unit_price_cents: 1_250 },
                NewSaleItem { product_id: "b".into(), quantity: 1, unit_price_cents: 2_500 },
            ],
            credit: None,
        };
        assert_eq!(sale.total().cents(), 5_000);
    }
}
