//! # Movement Repository
//!
//! The inventory ledger. Rows are only ever inserted; a cancelled sale is
//! reversed by `return` movements, never by editing the `sale` ones.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::new_id;
use tienda_core::{InventoryMovement, NewMovement};

const MOVEMENT_COLUMNS: &str = "id, product_id, direction, quantity, reason, recorded_at, user_id, \
     note, sale_id, cancelled_by, cancellation_reason";

/// Appends a movement and returns the stored row.
pub async fn insert(conn: &mut SqliteConnection, movement: &NewMovement) -> DbResult<InventoryMovement> {
    let id = new_id();
    debug!(
        id = %id,
        product_id = %movement.product_id,
        direction = ?movement.direction,
        reason = ?movement.reason,
        quantity = movement.quantity,
        "Appending inventory movement"
    );

    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, product_id, direction, quantity, reason, recorded_at,
            user_id, note, sale_id, cancelled_by, cancellation_reason
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&id)
    .bind(&movement.product_id)
    .bind(movement.direction)
    .bind(movement.quantity)
    .bind(movement.reason)
    .bind(movement.recorded_at)
    .bind(&movement.user_id)
    .bind(&movement.note)
    .bind(&movement.sale_id)
    .bind(&movement.cancelled_by)
    .bind(&movement.cancellation_reason)
    .execute(&mut *conn)
    .await?;

    Ok(InventoryMovement {
        id,
        product_id: movement.product_id.clone(),
        direction: movement.direction,
        quantity: movement.quantity,
        reason: movement.reason,
        recorded_at: movement.recorded_at,
        user_id: movement.user_id.clone(),
        note: movement.note.clone(),
        sale_id: movement.sale_id.clone(),
        cancelled_by: movement.cancelled_by.clone(),
        cancellation_reason: movement.cancellation_reason.clone(),
    })
}

/// Signed sum of every movement for a product.
pub async fn ledger_balance(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
    let balance: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(CASE direction WHEN 'in' THEN quantity ELSE -quantity END), 0)
        FROM inventory_movements
        WHERE product_id = ?1
        "#,
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(balance)
}

/// Repository for the inventory ledger.
#[derive(Debug, Clone)]
pub struct MovementRepository {
    pool: SqlitePool,
}

impl MovementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MovementRepository { pool }
    }

    pub async fn insert(&self, movement: &NewMovement) -> DbResult<InventoryMovement> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, movement).await
    }

    pub async fn ledger_balance(&self, product_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        ledger_balance(&mut conn, product_id).await
    }

    /// Movements of one product, oldest first.
    pub async fn list_for_product(&self, product_id: &str) -> DbResult<Vec<InventoryMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements \
             WHERE product_id = ?1 ORDER BY recorded_at, rowid"
        );
        let movements = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    /// Movements written on behalf of a sale (its `sale` and `return` rows).
    pub async fn list_for_sale(&self, sale_id: &str) -> DbResult<Vec<InventoryMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements \
             WHERE sale_id = ?1 ORDER BY recorded_at, rowid"
        );
        let movements = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::{NaiveDate, NaiveDateTime};
    use tienda_core::{MovementDirection, MovementReason, Product, ProductState};

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn movement(product_id: &str, direction: MovementDirection, quantity: i64) -> NewMovement {
        NewMovement {
            product_id: product_id.to_string(),
            direction,
            quantity,
            reason: MovementReason::Adjustment,
            recorded_at: at(),
            user_id: "u-1".to_string(),
            note: None,
            sale_id: None,
            cancelled_by: None,
            cancellation_reason: None,
        }
    }

    #[tokio::test]
    async fn test_ledger_balance_is_signed_sum() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = Product {
            id: new_id(),
            name: "Yerba 1kg".to_string(),
            unit_price_cents: 2_000,
            wholesale_price_cents: None,
            current_stock: 0,
            min_stock: 0,
            state: ProductState::Active,
            created_at: at(),
            updated_at: at(),
        };
        db.products().insert(&product).await.unwrap();

        assert_eq!(db.movements().ledger_balance(&product.id).await.unwrap(), 0);

        db.movements()
            .insert(&movement(&product.id, MovementDirection::In, 10))
            .await
            .unwrap();
        db.movements()
            .insert(&movement(&product.id, MovementDirection::Out, 4))
            .await
            .unwrap();

        assert_eq!(db.movements().ledger_balance(&product.id).await.unwrap(), 6);
        let rows = db.movements().list_for_product(&product.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].signed_quantity(), -4);
    }
}
