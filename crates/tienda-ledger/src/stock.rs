//! # Stock Ledger
//!
//! Keeps `current_stock` (a cached projection) in step with the append-only
//! `inventory_movements` table (the source of truth).
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  path              stock write               movement         atomic?  │
//! │  ────────────────  ────────────────────────  ───────────────  ──────── │
//! │  create_product    insert with initial       in / purchase    yes      │
//! │  receive_stock     + quantity                in / purchase    yes      │
//! │  sale (engine)     conditional − quantity    out / sale       yes      │
//! │  cancellation      + quantity                in / return      yes      │
//! │  adjust_stock      set to new level          in|out / adjust  NO       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `adjust_stock` keeps the stock change when its movement cannot be
//! written and only logs the failure. [`StockLedger::verify_product`]
//! reports the drift that leaves behind.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use tienda_core::validation::{
    validate_new_product, validate_price_cents, validate_quantity, validate_reference, validate_stock_level,
};
use tienda_core::{
    CoreError, MovementDirection, MovementReason, NewMovement, NewProduct, NewSaleItem, Product, ProductState,
    SaleDetail, StockReconciliation,
};
use tienda_db::repository::{movement, product};
use tienda_db::{new_id, Database, DbError};

use crate::clock::Clock;
use crate::error::{LedgerError, LedgerResult};

/// Cached stock against ledger balance for one product.
#[derive(Debug, Clone, Serialize)]
pub struct StockCheck {
    pub product_id: String,
    pub name: String,
    #[serde(flatten)]
    pub reconciliation: StockReconciliation,
}

/// Product catalogue and stock movements.
#[derive(Debug, Clone)]
pub struct StockLedger {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl StockLedger {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        StockLedger { db, clock }
    }

    pub async fn product(&self, product_id: &str) -> LedgerResult<Product> {
        self.db
            .products()
            .get(product_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Product", product_id))
    }

    /// Adds a catalogue entry. The opening stock is recorded as a purchase
    /// so the ledger balance matches from the first row.
    pub async fn create_product(&self, input: NewProduct, user_id: &str) -> LedgerResult<Product> {
        validate_new_product(&input)?;
        validate_reference("user_id", user_id)?;

        let name = input.name.trim().to_string();
        if self.db.products().find_by_name(&name).await?.is_some() {
            return Err(DbError::duplicate("name", name).into());
        }

        let now = self.clock.now();
        let created = Product {
            id: new_id(),
            name,
            unit_price_cents: input.unit_price_cents,
            wholesale_price_cents: input.wholesale_price_cents,
            current_stock: input.initial_stock,
            min_stock: input.min_stock,
            state: ProductState::Active,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.db.pool().begin().await?;
        product::insert(&mut tx, &created).await?;
        if created.current_stock > 0 {
            let opening = NewMovement {
                product_id: created.id.clone(),
                direction: MovementDirection::In,
                quantity: created.current_stock,
                reason: MovementReason::Purchase,
                recorded_at: now,
                user_id: user_id.to_string(),
                note: Some("Opening stock".to_string()),
                sale_id: None,
                cancelled_by: None,
                cancellation_reason: None,
            };
            movement::insert(&mut tx, &opening)
                .await
                .map_err(|source| LedgerError::MovementInsertFailed {
                    product_id: created.id.clone(),
                    source,
                })?;
        }
        tx.commit().await?;

        info!(id = %created.id, name = %created.name, stock = created.current_stock, "Product created");
        Ok(created)
    }

    /// Sets the stock to an absolute level and logs the difference.
    ///
    /// The movement is appended after the stock write, outside a
    /// transaction; if it fails the new level stands and a warning is
    /// logged.
    pub async fn adjust_stock(&self, product_id: &str, new_quantity: i64, user_id: &str) -> LedgerResult<Product> {
        validate_stock_level("new_quantity", new_quantity)?;
        validate_reference("user_id", user_id)?;

        let current = self.product(product_id).await?;
        let delta = new_quantity - current.current_stock;
        let now = self.clock.now();

        self.db.products().set_stock(product_id, new_quantity, now).await?;

        if let Some(direction) = MovementDirection::from_delta(delta) {
            let adjustment = NewMovement {
                product_id: product_id.to_string(),
                direction,
                quantity: delta.abs(),
                reason: MovementReason::Adjustment,
                recorded_at: now,
                user_id: user_id.to_string(),
                note: Some(format!("Stock adjusted from {} to {}", current.current_stock, new_quantity)),
                sale_id: None,
                cancelled_by: None,
                cancellation_reason: None,
            };
            if let Err(e) = self.db.movements().insert(&adjustment).await {
                warn!(
                    product_id = %product_id,
                    delta,
                    error = %e,
                    "Adjustment movement not recorded; stock change kept"
                );
            }
        }

        info!(product_id = %product_id, from = current.current_stock, to = new_quantity, "Stock adjusted");
        self.product(product_id).await
    }

    /// Read-only check that every line can be served right now.
    ///
    /// Quantities of repeated products are summed. Nothing is locked: the
    /// conditional decrement at commit time is what actually guards stock.
    pub async fn reserve_for_sale(&self, items: &[NewSaleItem]) -> LedgerResult<()> {
        let mut wanted: Vec<(&str, i64)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for item in items {
            match index.get(item.product_id.as_str()) {
                Some(&i) => wanted[i].1 += item.quantity,
                None => {
                    index.insert(item.product_id.as_str(), wanted.len());
                    wanted.push((item.product_id.as_str(), item.quantity));
                }
            }
        }

        let products = self.db.products();
        for (product_id, quantity) in wanted {
            let product = products
                .get(product_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("Product", product_id))?;
            product.ensure_can_sell(quantity)?;
        }
        Ok(())
    }

    /// Puts the quantities of a sale back on the shelf in one transaction.
    pub async fn revert_for_sale(
        &self,
        sale_id: &str,
        details: &[SaleDetail],
        user_id: &str,
        reason: &str,
    ) -> LedgerResult<()> {
        let mut tx = self.db.pool().begin().await?;
        restock_for_cancellation(&mut tx, sale_id, details, user_id, reason, self.clock.now()).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Goods received from a supplier.
    pub async fn receive_stock(
        &self,
        product_id: &str,
        quantity: i64,
        user_id: &str,
        note: Option<String>,
    ) -> LedgerResult<Product> {
        validate_quantity(quantity)?;
        validate_reference("user_id", user_id)?;
        let now = self.clock.now();

        let mut tx = self.db.pool().begin().await?;
        product::increment_stock(&mut tx, product_id, quantity, now)
            .await
            .map_err(|e| not_found_as_product(e, product_id))?;
        let purchase = NewMovement {
            product_id: product_id.to_string(),
            direction: MovementDirection::In,
            quantity,
            reason: MovementReason::Purchase,
            recorded_at: now,
            user_id: user_id.to_string(),
            note,
            sale_id: None,
            cancelled_by: None,
            cancellation_reason: None,
        };
        movement::insert(&mut tx, &purchase)
            .await
            .map_err(|source| LedgerError::MovementInsertFailed {
                product_id: product_id.to_string(),
                source,
            })?;
        tx.commit().await?;

        info!(product_id = %product_id, quantity, "Stock received");
        self.product(product_id).await
    }

    pub async fn update_prices(
        &self,
        product_id: &str,
        unit_price_cents: i64,
        wholesale_price_cents: Option<i64>,
    ) -> LedgerResult<Product> {
        validate_price_cents(unit_price_cents)?;
        if let Some(wholesale) = wholesale_price_cents {
            validate_price_cents(wholesale)?;
        }
        self.db
            .products()
            .update_prices(product_id, unit_price_cents, wholesale_price_cents, self.clock.now())
            .await
            .map_err(|e| not_found_as_product(e, product_id))?;
        self.product(product_id).await
    }

    /// Activates or retires a product. Retired products cannot be sold.
    pub async fn set_active(&self, product_id: &str, active: bool) -> LedgerResult<Product> {
        let state = if active {
            ProductState::Active
        } else {
            ProductState::Inactive
        };
        self.db
            .products()
            .set_state(product_id, state, self.clock.now())
            .await
            .map_err(|e| not_found_as_product(e, product_id))?;
        info!(product_id = %product_id, ?state, "Product state changed");
        self.product(product_id).await
    }

    pub async fn low_stock(&self) -> LedgerResult<Vec<Product>> {
        Ok(self.db.products().low_stock().await?)
    }

    /// Compares the cached stock with the signed sum of its movements.
    pub async fn verify_product(&self, product_id: &str) -> LedgerResult<StockReconciliation> {
        let product = self.product(product_id).await?;
        let ledger = self.db.movements().ledger_balance(product_id).await?;
        let check = StockReconciliation::new(product.current_stock, ledger);
        if !check.consistent {
            warn!(product_id = %product_id, cached = check.cached, ledger = check.ledger, "Stock drift detected");
        }
        Ok(check)
    }

    /// [`StockLedger::verify_product`] for the whole catalogue.
    pub async fn verify_all(&self) -> LedgerResult<Vec<StockCheck>> {
        let products = self.db.products().list_all().await?;
        let movements = self.db.movements();
        let mut checks = Vec::with_capacity(products.len());
        for product in products {
            let ledger = movements.ledger_balance(&product.id).await?;
            checks.push(StockCheck {
                reconciliation: StockReconciliation::new(product.current_stock, ledger),
                product_id: product.id,
                name: product.name,
            });
        }
        let drifted = checks.iter().filter(|c| !c.reconciliation.consistent).count();
        debug!(products = checks.len(), drifted, "Stock verification finished");
        Ok(checks)
    }
}

fn not_found_as_product(err: DbError, product_id: &str) -> LedgerError {
    match err {
        DbError::NotFound { .. } => LedgerError::not_found("Product", product_id),
        other => other.into(),
    }
}

// =============================================================================
// Transaction steps used by the sale engine
// =============================================================================

/// Takes the stock for each line and writes its `out`/`sale` movement.
///
/// Runs inside the caller's transaction; any error leaves the caller to
/// drop it, which undoes every line already taken.
pub(crate) async fn take_for_sale(
    conn: &mut SqliteConnection,
    sale_id: &str,
    details: &[SaleDetail],
    user_id: &str,
    at: chrono::NaiveDateTime,
) -> LedgerResult<()> {
    for detail in details {
        let taken = product::decrement_stock(conn, &detail.product_id, detail.quantity, at).await?;
        if !taken {
            let available = match product::get(conn, &detail.product_id).await? {
                Some(p) if p.is_active() => p.current_stock,
                Some(_) => 0,
                None => return Err(LedgerError::not_found("Product", &detail.product_id)),
            };
            return Err(CoreError::InsufficientStock {
                product_id: detail.product_id.clone(),
                available,
                requested: detail.quantity,
            }
            .into());
        }

        let out = NewMovement {
            product_id: detail.product_id.clone(),
            direction: MovementDirection::Out,
            quantity: detail.quantity,
            reason: MovementReason::Sale,
            recorded_at: at,
            user_id: user_id.to_string(),
            note: None,
            sale_id: Some(sale_id.to_string()),
            cancelled_by: None,
            cancellation_reason: None,
        };
        movement::insert(conn, &out)
            .await
            .map_err(|source| LedgerError::MovementInsertFailed {
                product_id: detail.product_id.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Returns each line to stock with an `in`/`return` movement.
pub(crate) async fn restock_for_cancellation(
    conn: &mut SqliteConnection,
    sale_id: &str,
    details: &[SaleDetail],
    user_id: &str,
    reason: &str,
    at: chrono::NaiveDateTime,
) -> LedgerResult<()> {
    for detail in details {
        product::increment_stock(conn, &detail.product_id, detail.quantity, at)
            .await
            .map_err(|e| not_found_as_product(e, &detail.product_id))?;

        let back = NewMovement {
            product_id: detail.product_id.clone(),
            direction: MovementDirection::In,
            quantity: detail.quantity,
            reason: MovementReason::Return,
            recorded_at: at,
            user_id: user_id.to_string(),
            note: Some(format!("Sale {sale_id} cancelled by {user_id}: {reason}")),
            sale_id: Some(sale_id.to_string()),
            cancelled_by: Some(user_id.to_string()),
            cancellation_reason: Some(reason.to_string()),
        };
        movement::insert(conn, &back)
            .await
            .map_err(|source| LedgerError::MovementInsertFailed {
                product_id: detail.product_id.clone(),
                source,
            })?;
    }
    Ok(())
}
