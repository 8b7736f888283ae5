//! # Validation Module
//!
//! Input validation utilities for Tienda POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure)                                           │
//! │  ├── Required references, ranges, credit rules                         │
//! │  └── Runs before any read or write                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engines (tienda-ledger)                                      │
//! │  └── Rules that need stored state (stock, open register, voided)       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (current_stock >= 0)                                        │
//! │  ├── UNIQUE product name, one open register per date                   │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use tienda_core::validation::{validate_product_name, validate_quantity};
//!
//! validate_product_name("Arroz 1kg").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::distributor::{DeliveryItem, NewDistributorSale};
use crate::error::ValidationError;
use crate::types::{NewProduct, NewSale};
use crate::{
    MAX_AMOUNT_CENTS, MAX_CREDIT_INSTALLMENTS, MAX_DISTRIBUTOR_QUANTITY, MAX_ITEM_QUANTITY, MAX_PRICE_CENTS,
    MAX_SALE_ITEMS,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty
/// - Must be between 1 and 200 characters
///
/// ## Example
/// ```rust
/// use tienda_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Aceite 1L").is_ok());
/// assert!(validate_product_name("").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a reference to another entity (user, client, distributor).
pub fn validate_reference(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a sale line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items).
///
/// ## Example
/// ```rust
/// use tienda_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }
    if cents > MAX_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a stock figure (on-hand, minimum, counted).
pub fn validate_stock_level(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a payment amount in cents.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "payment amount".to_string(),
            min: 1,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

/// Validates a cash count (opening float, counted cash, cash received).
pub fn validate_cash_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    if cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }
    Ok(())
}

/// Validates a monthly interest rate in basis points (0% to 100%).
pub fn validate_interest_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "monthly_rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates an installment count (1 to MAX_CREDIT_INSTALLMENTS).
pub fn validate_installments(count: u32) -> ValidationResult<()> {
    if count == 0 || i64::from(count) > MAX_CREDIT_INSTALLMENTS {
        return Err(ValidationError::OutOfRange {
            field: "installments".to_string(),
            min: 1,
            max: MAX_CREDIT_INSTALLMENTS,
        });
    }
    Ok(())
}

// =============================================================================
// Request Validators
// =============================================================================

/// Validates a new catalogue entry.
pub fn validate_new_product(input: &NewProduct) -> ValidationResult<()> {
    validate_product_name(&input.name)?;
    validate_price_cents(input.unit_price_cents)?;
    if let Some(wholesale) = input.wholesale_price_cents {
        validate_price_cents(wholesale)?;
    }
    validate_stock_level("initial_stock", input.initial_stock)?;
    validate_stock_level("min_stock", input.min_stock)?;
    Ok(())
}

/// Validates a sale request.
///
/// ## Rules
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  every sale      seller set, 1..=MAX_SALE_ITEMS lines, qty > 0, price ≥ 0│
/// │  credit          client set, credit terms present,                     │
/// │                  installments 1..=120, 0 ≤ down payment ≤ total         │
/// │  not credit      no credit terms                                       │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_new_sale(sale: &NewSale) -> ValidationResult<()> {
    validate_reference("seller_id", &sale.seller_id)?;

    if sale.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    if sale.items.len() > MAX_SALE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_ITEMS as i64,
        });
    }
    for item in &sale.items {
        validate_reference("product_id", &item.product_id)?;
        validate_quantity(item.quantity)?;
        validate_price_cents(item.unit_price_cents)?;
    }

    if !sale.payment_method.is_credit() {
        if sale.credit.is_some() {
            return Err(ValidationError::NotAllowed {
                field: "credit".to_string(),
                reason: format!("payment method is {}", sale.payment_method.as_str()),
            });
        }
        return Ok(());
    }

    match sale.client_id.as_deref() {
        Some(client) => validate_reference("client_id", client)?,
        None => {
            return Err(ValidationError::Required {
                field: "client_id".to_string(),
            })
        }
    }

    let credit = sale.credit.as_ref().ok_or_else(|| ValidationError::Required {
        field: "installments".to_string(),
    })?;
    validate_installments(credit.installments)?;
    validate_interest_rate_bps(credit.monthly_rate.bps())?;

    let total = sale.total().cents();
    if credit.down_payment_cents < 0 || credit.down_payment_cents > total {
        return Err(ValidationError::OutOfRange {
            field: "down_payment".to_string(),
            min: 0,
            max: total,
        });
    }

    Ok(())
}

/// Validates a distributor ledger entry.
pub fn validate_distributor_sale(input: &NewDistributorSale) -> ValidationResult<()> {
    validate_reference("distributor_id", &input.distributor_id)?;
    validate_reference("product_id", &input.product_id)?;
    validate_stock_level("quantity_sold", input.quantity_sold)?;
    validate_stock_level("quantity_top_up", input.quantity_top_up)?;
    let quantity = input.quantity_sold.saturating_add(input.quantity_top_up);
    if quantity == 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if quantity > MAX_DISTRIBUTOR_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_DISTRIBUTOR_QUANTITY,
        });
    }
    if let Some(price) = input.unit_price_cents {
        validate_price_cents(price)?;
    }
    Ok(())
}

/// Validates the lines of a delivery checked against preregistros.
pub fn validate_delivery_items(items: &[DeliveryItem]) -> ValidationResult<()> {
    for item in items {
        validate_reference("product_id", &item.product_id)?;
        if item.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CreditRequest, InterestRate, NewSaleItem, PaymentMethod};

    fn sale(method: PaymentMethod) -> NewSale {
        NewSale {
            payment_method: method,
            client_id: None,
            seller_id: "seller".to_string(),
            items: vec![NewSaleItem {
                product_id: "p-1".to_string(),
                quantity: 2,
                unit_price_cents: 50_000,
            }],
            credit: None,
        }
    }

    fn credit_terms(installments: u32) -> Option<CreditRequest> {
        Some(CreditRequest {
            installments,
            monthly_rate: InterestRate::from_bps(500),
            down_payment_cents: 20_000,
        })
    }

    #[test]
    fn test_validate_product_name() {
        assert!(validate_product_name("Azúcar 1kg").is_ok());
        assert!(validate_product_name("   ").is_err());
        assert!(validate_product_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_installments_bounds() {
        assert!(validate_installments(1).is_ok());
        assert!(validate_installments(120).is_ok());
        assert!(validate_installments(0).is_err());
        assert!(validate_installments(121).is_err());
    }

    #[test]
    fn test_cash_sale_is_valid() {
        assert!(validate_new_sale(&sale(PaymentMethod::Cash)).is_ok());
    }

    #[test]
    fn test_cash_sale_rejects_credit_terms() {
        let mut cash = sale(PaymentMethod::Cash);
        cash.credit = credit_terms(3);
        assert!(matches!(
            validate_new_sale(&cash),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_credit_sale_requires_client_and_installments() {
        let mut credit = sale(PaymentMethod::Credit);
        credit.credit = credit_terms(3);
        assert!(matches!(
            validate_new_sale(&credit),
            Err(ValidationError::Required { ref field }) if field == "client_id"
        ));

        credit.client_id = Some("client-9".to_string());
        assert!(validate_new_sale(&credit).is_ok());

        credit.credit = None;
        assert!(matches!(
            validate_new_sale(&credit),
            Err(ValidationError::Required { ref field }) if field == "installments"
        ));

        credit.credit = credit_terms(121);
        assert!(validate_new_sale(&credit).is_err());
    }

    #[test]
    fn test_down_payment_cannot_exceed_total() {
        let mut credit = sale(PaymentMethod::Credit);
        credit.client_id = Some("client-9".to_string());
        credit.credit = Some(CreditRequest {
            installments: 2,
            monthly_rate: InterestRate::from_bps(500),
            down_payment_cents: 100_001,
        });
        assert!(validate_new_sale(&credit).is_err());
    }

    #[test]
    fn test_empty_sale_rejected() {
        let mut empty = sale(PaymentMethod::Qr);
        empty.items.clear();
        assert!(validate_new_sale(&empty).is_err());
    }

    #[test]
    fn test_distributor_sale_needs_some_quantity() {
        let mut input = NewDistributorSale {
            distributor_id: "d-1".to_string(),
            product_id: "p-1".to_string(),
            quantity_sold: 0,
            quantity_top_up: 0,
            unit_price_cents: None,
            order_id: None,
        };
        assert!(validate_distributor_sale(&input).is_err());
        input.quantity_top_up = 4;
        assert!(validate_distributor_sale(&input).is_ok());

        input.quantity_sold = i64::MAX;
        assert!(matches!(
            validate_distributor_sale(&input),
            Err(ValidationError::OutOfRange { .. })
        ));
        input.quantity_sold = 1;
        input.unit_price_cents = Some(i64::MAX / 2);
        assert!(validate_distributor_sale(&input).is_err());
    }

    #[test]
    fn test_huge_prices_and_amounts_rejected() {
        assert!(validate_price_cents(MAX_PRICE_CENTS).is_ok());
        assert!(validate_price_cents(MAX_PRICE_CENTS + 1).is_err());
        assert!(validate_cash_amount("counted cash", i64::MAX).is_err());
        assert!(validate_payment_amount(i64::MAX).is_err());

        let mut input = sale(PaymentMethod::Cash);
        input.items[0].quantity = 3;
        input.items[0].unit_price_cents = i64::MAX / 2;
        assert!(matches!(
            validate_new_sale(&input),
            Err(ValidationError::OutOfRange { .. })
        ));

        // Largest valid sale still fits comfortably
        input.items = (0..MAX_SALE_ITEMS)
            .map(|i| NewSaleItem {
                product_id: format!("p-{i}"),
                quantity: MAX_ITEM_QUANTITY,
                unit_price_cents: MAX_PRICE_CENTS,
            })
            .collect();
        assert!(validate_new_sale(&input).is_ok());
        assert!(input.total().is_positive());
    }
}
