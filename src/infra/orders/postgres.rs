//! Postgres-backed order store.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::core::{Admission, InFlightOrder, OrderId, OrderStatus, OrderStore, SlotId, StoreError};
use crate::infra::store::postgres::sqlx_error;

/// Order records in the `kitchen_orders` table.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Migration statements for order storage.
    pub fn migrations() -> &'static [&'static str] {
        &[r"
CREATE TABLE IF NOT EXISTS kitchen_orders (
    order_id UUID PRIMARY KEY,
    status TEXT NOT NULL,
    value BIGINT NOT NULL,
    slot_id BIGINT,
    visible_at TIMESTAMPTZ,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_kitchen_orders_status ON kitchen_orders (status);
"]
    }

    /// Apply [`Self::migrations`].
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        for statement in Self::migrations() {
            sqlx::raw_sql(statement)
                .execute(&self.pool)
                .await
                .map_err(sqlx_error)?;
        }
        Ok(())
    }

    /// Record a status change coming from the order's own workflow.
    pub async fn set_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            "UPDATE kitchen_orders SET status = $2, updated_at = NOW() WHERE order_id = $1",
        )
        .bind(order_id.0)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(sqlx_error)?
        .rows_affected();
        Ok(updated > 0)
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn list_in_flight(&self) -> Result<Vec<InFlightOrder>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT order_id, status, value, slot_id, visible_at
            FROM kitchen_orders
            WHERE status NOT IN ('delivered', 'cancelled')
            ORDER BY order_id
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error)?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status").map_err(sqlx_error)?;
                Ok(InFlightOrder {
                    order_id: OrderId(row.try_get("order_id").map_err(sqlx_error)?),
                    status: status.parse().map_err(StoreError::Corrupt)?,
                    value: row.try_get("value").map_err(sqlx_error)?,
                    slot_id: row
                        .try_get::<Option<i64>, _>("slot_id")
                        .map_err(sqlx_error)?
                        .map(SlotId),
                    visible_at: row.try_get("visible_at").map_err(sqlx_error)?,
                })
            })
            .collect()
    }

    async fn persist_assignment(&self, admission: &Admission) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO kitchen_orders (order_id, status, value, slot_id, visible_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id) DO UPDATE
                SET value = EXCLUDED.value,
                    slot_id = EXCLUDED.slot_id,
                    visible_at = EXCLUDED.visible_at,
                    updated_at = NOW()
            ",
        )
        .bind(admission.order_id.0)
        .bind(OrderStatus::Scheduled.as_str())
        .bind(admission.reserved_value)
        .bind(admission.slot_id.0)
        .bind(admission.visible_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error)?;
        Ok(())
    }
}
