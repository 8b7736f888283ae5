//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Key Operations
//! - Catalogue CRUD (name is unique)
//! - Stock cache updates, including the conditional decrement used by sales
//!
//! ## Conditional Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE products                                                        │
//! │     SET current_stock = current_stock - :qty                            │
//! │   WHERE id = :id AND state = 'active' AND current_stock >= :qty         │
//! │                                                                         │
//! │  rows_affected = 1  → stock taken                                      │
//! │  rows_affected = 0  → someone else got there first (or inactive)       │
//! │                                                                         │
//! │  The read-only stock check before a sale can race; this statement      │
//! │  cannot, because the check and the write are one row update.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDateTime;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tienda_core::{Product, ProductState};

const PRODUCT_COLUMNS: &str = "id, name, unit_price_cents, wholesale_price_cents, current_stock, \
     min_stock, state, created_at, updated_at";

// =============================================================================
// Connection-level statements
// =============================================================================

pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, name = %product.name, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (
            id, name, unit_price_cents, wholesale_price_cents,
            current_stock, min_stock, state, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(product.unit_price_cents)
    .bind(product.wholesale_price_cents)
    .bind(product.current_stock)
    .bind(product.min_stock)
    .bind(product.state)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE name = ?1");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

/// Takes `quantity` units if the product is active and has them.
///
/// ## Returns
/// * `Ok(true)` - Stock decremented
/// * `Ok(false)` - Not enough stock (or inactive); nothing changed
pub async fn decrement_stock(
    conn: &mut SqliteConnection,
    id: &str,
    quantity: i64,
    at: NaiveDateTime,
) -> DbResult<bool> {
    debug!(id = %id, quantity, "Decrementing stock");

    let result = sqlx::query(
        r#"
        UPDATE products
        SET current_stock = current_stock - ?1,
            updated_at = ?2
        WHERE id = ?3
          AND state = 'active'
          AND current_stock >= ?1
        "#,
    )
    .bind(quantity)
    .bind(at)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn increment_stock(
    conn: &mut SqliteConnection,
    id: &str,
    quantity: i64,
    at: NaiveDateTime,
) -> DbResult<()> {
    debug!(id = %id, quantity, "Incrementing stock");

    let result = sqlx::query(
        "UPDATE products SET current_stock = current_stock + ?1, updated_at = ?2 WHERE id = ?3",
    )
    .bind(quantity)
    .bind(at)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }
    Ok(())
}

pub async fn set_stock(
    conn: &mut SqliteConnection,
    id: &str,
    stock: i64,
    at: NaiveDateTime,
) -> DbResult<()> {
    debug!(id = %id, stock, "Setting stock");

    let result = sqlx::query("UPDATE products SET current_stock = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(stock)
        .bind(at)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", id));
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let product = repo.get("uuid-here").await?;
/// let low = repo.low_stock().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, id).await
    }

    pub async fn find_by_name(&self, name: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        find_by_name(&mut conn, name).await
    }

    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, product).await
    }

    pub async fn set_stock(&self, id: &str, stock: i64, at: NaiveDateTime) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        set_stock(&mut conn, id, stock, at).await
    }

    /// Lists every product, active or not, by name.
    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Active products at or below their minimum stock.
    pub async fn low_stock(&self) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE state = 'active' AND current_stock <= min_stock \
             ORDER BY current_stock, name"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Low stock products");
        Ok(products)
    }

    pub async fn update_prices(
        &self,
        id: &str,
        unit_price_cents: i64,
        wholesale_price_cents: Option<i64>,
        at: NaiveDateTime,
    ) -> DbResult<()> {
        debug!(id = %id, unit_price_cents, "Updating prices");

        let result = sqlx::query(
            r#"
            UPDATE products
            SET unit_price_cents = ?1, wholesale_price_cents = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(unit_price_cents)
        .bind(wholesale_price_cents)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    pub async fn set_state(&self, id: &str, state: ProductState, at: NaiveDateTime) -> DbResult<()> {
        debug!(id = %id, ?state, "Setting product state");

        let result = sqlx::query("UPDATE products SET state = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(state)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    /// Counts total products in the database.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::new_id;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn product(name: &str, stock: i64) -> Product {
        Product {
            id: new_id(),
            name: name.to_string(),
            unit_price_cents: 850,
            wholesale_price_cents: Some(700),
            current_stock: stock,
            min_stock: 3,
            state: ProductState::Active,
            created_at: at(),
            updated_at: at(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product("Arroz 1kg", 10);
        db.products().insert(&p).await.unwrap();

        let loaded = db.products().get(&p.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Arroz 1kg");
        assert_eq!(loaded.current_stock, 10);
        assert_eq!(loaded.wholesale_price_cents, Some(700));
        assert_eq!(loaded.created_at, at());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products().insert(&product("Arroz 1kg", 1)).await.unwrap();

        let err = db.products().insert(&product("Arroz 1kg", 2)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_conditional_decrement() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product("Azúcar 1kg", 5);
        db.products().insert(&p).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(decrement_stock(&mut conn, &p.id, 5, at()).await.unwrap());
        assert!(!decrement_stock(&mut conn, &p.id, 1, at()).await.unwrap());
        drop(conn);

        let loaded = db.products().get(&p.id).await.unwrap().unwrap();
        assert_eq!(loaded.current_stock, 0);
    }

    #[tokio::test]
    async fn test_negative_stock_violates_check() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = product("Sal 500g", 1);
        db.products().insert(&p).await.unwrap();

        let err = db.products().set_stock(&p.id, -1, at()).await.unwrap_err();
        assert!(matches!(err, DbError::CheckViolation { .. }));
    }

    #[tokio::test]
    async fn test_low_stock_excludes_inactive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let low = product("Fideos", 2);
        let inactive = product("Galletas", 0);
        let plenty = product("Aceite", 50);
        for p in [&low, &inactive, &plenty] {
            db.products().insert(p).await.unwrap();
        }
        db.products()
            .set_state(&inactive.id, ProductState::Inactive, at())
            .await
            .unwrap();

        let report = db.products().low_stock().await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].id, low.id);
    }
}
