//! Postgres-backed capacity and membership store.
//!
//! Each primitive runs as one transaction. The slot row is locked with
//! `SELECT ... FOR UPDATE` before the capacity check, so concurrent
//! reservations against one slot are serialized by the database and a
//! rejected reservation rolls back without side effects.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::core::{
    Association, CapacityStore, MembershipStore, OrderId, Reservation, ReserveOutcome, SlotControls,
    SlotId, SlotInfo, SlotPlan, SlotSnapshot, StoreError,
};
use crate::util::Clock;

const GLOBAL_CAPACITY_KEY: &str = "max_capacity";

/// Map a driver error onto the store taxonomy.
pub(crate) fn sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(err.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn get<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(sqlx_error)
}

/// Capacity store over a shared Postgres database.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl PostgresStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { pool, clock, ttl }
    }

    /// Migration statements for slot state.
    pub fn migrations() -> &'static [&'static str] {
        &[r"
CREATE TABLE IF NOT EXISTS slot_loads (
    slot_id BIGINT PRIMARY KEY,
    load BIGINT NOT NULL DEFAULT 0,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ NOT NULL,
    max_capacity BIGINT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE IF NOT EXISTS slot_orders (
    slot_id BIGINT NOT NULL,
    order_id UUID NOT NULL,
    PRIMARY KEY (slot_id, order_id)
);
CREATE TABLE IF NOT EXISTS slot_flags (
    slot_id BIGINT PRIMARY KEY,
    disabled_until TIMESTAMPTZ,
    max_capacity BIGINT,
    delivery_plan BIGINT,
    pickup_plan BIGINT
);
CREATE TABLE IF NOT EXISTS slot_config (
    key TEXT PRIMARY KEY,
    value BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS order_slots (
    order_id UUID PRIMARY KEY,
    slot_id BIGINT NOT NULL,
    price BIGINT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_order_slots_slot ON order_slots (slot_id);
CREATE TABLE IF NOT EXISTS order_membership (
    order_id UUID PRIMARY KEY,
    state TEXT NOT NULL CHECK (state IN ('pending', 'active')),
    visible_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_order_membership_due ON order_membership (state, visible_at);
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

    /// Delete rows whose retention has elapsed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(sqlx_error)?;
        sqlx::query(
            "DELETE FROM slot_orders WHERE slot_id IN (SELECT slot_id FROM slot_loads WHERE expires_at <= $1)",
        )
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error)?;
        let loads = sqlx::query("DELETE FROM slot_loads WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_error)?
            .rows_affected();
        let associations = sqlx::query("DELETE FROM order_slots WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_error)?
            .rows_affected();
        sqlx::query("UPDATE slot_flags SET disabled_until = NULL WHERE disabled_until <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_error)?;
        tx.commit().await.map_err(sqlx_error)?;
        Ok(loads + associations)
    }

    fn retain_until(&self, now: DateTime<Utc>, slot_end: DateTime<Utc>) -> DateTime<Utc> {
        now.max(slot_end) + self.ttl
    }

    async fn membership_of(&self, state: &str) -> Result<Vec<OrderId>, StoreError> {
        let rows = sqlx::query(
            "SELECT order_id FROM order_membership WHERE state = $1 ORDER BY order_id",
        )
        .bind(state)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error)?;
        rows.iter()
            .map(|row| get::<Uuid>(row, "order_id").map(OrderId))
            .collect()
    }
}

#[async_trait]
impl CapacityStore for PostgresStore {
    async fn try_reserve(&self, reservation: &Reservation) -> Result<ReserveOutcome, StoreError> {
        let now = self.clock.now();
        let window = reservation.window;
        let order = reservation.order_id.0;
        let until = self.retain_until(now, window.end);
        let mut tx = self.pool.begin().await.map_err(sqlx_error)?;

        let existing = sqlx::query(
            "SELECT slot_id FROM order_slots WHERE order_id = $1 AND expires_at > $2 FOR UPDATE",
        )
        .bind(order)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(sqlx_error)?;
        if let Some(row) = existing {
            return Ok(ReserveOutcome::AlreadyReserved {
                slot_id: SlotId(get(&row, "slot_id")?),
            });
        }

        sqlx::query(
            r"
            INSERT INTO slot_loads (slot_id, load, start_time, end_time, max_capacity, expires_at)
            VALUES ($1, 0, $2, $3, $4, $5)
            ON CONFLICT (slot_id) DO NOTHING
            ",
        )
        .bind(window.id.0)
        .bind(window.start)
        .bind(window.end)
        .bind(reservation.max_capacity)
        .bind(until)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error)?;

        let row = sqlx::query("SELECT load, expires_at FROM slot_loads WHERE slot_id = $1 FOR UPDATE")
            .bind(window.id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(sqlx_error)?;
        let expired = get::<DateTime<Utc>>(&row, "expires_at")? <= now;
        let load = if expired { 0 } else { get::<i64>(&row, "load")? };

        let Some(new_load) = load
            .checked_add(reservation.amount)
            .filter(|total| *total <= reservation.max_capacity)
        else {
            tx.rollback().await.map_err(sqlx_error)?;
            return Ok(ReserveOutcome::Rejected { load });
        };

        if expired {
            sqlx::query("DELETE FROM slot_orders WHERE slot_id = $1")
                .bind(window.id.0)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error)?;
            sqlx::query(
                "UPDATE slot_loads SET load = $2, max_capacity = $3, expires_at = $4 WHERE slot_id = $1",
            )
            .bind(window.id.0)
            .bind(new_load)
            .bind(reservation.max_capacity)
            .bind(until)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_error)?;
        } else {
            sqlx::query("UPDATE slot_loads SET load = $2, expires_at = $3 WHERE slot_id = $1")
                .bind(window.id.0)
                .bind(new_load)
                .bind(until)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_error)?;
        }

        sqlx::query(
            "INSERT INTO slot_orders (slot_id, order_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(window.id.0)
        .bind(order)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error)?;

        let written = sqlx::query(
            r"
            INSERT INTO order_slots (order_id, slot_id, price, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO UPDATE
                SET slot_id = EXCLUDED.slot_id, price = EXCLUDED.price, expires_at = EXCLUDED.expires_at
                WHERE order_slots.expires_at <= $5
            ",
        )
        .bind(order)
        .bind(window.id.0)
        .bind(reservation.amount)
        .bind(until)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error)?
        .rows_affected();

        if written == 0 {
            // A concurrent reservation for the same order committed first.
            let row = sqlx::query("SELECT slot_id FROM order_slots WHERE order_id = $1")
                .bind(order)
                .fetch_one(&mut *tx)
                .await
                .map_err(sqlx_error)?;
            let slot_id = SlotId(get(&row, "slot_id")?);
            tx.rollback().await.map_err(sqlx_error)?;
            return Ok(ReserveOutcome::AlreadyReserved { slot_id });
        }

        tx.commit().await.map_err(sqlx_error)?;
        Ok(ReserveOutcome::Accepted { load: new_load })
    }

    async fn release(&self, order_id: &OrderId) -> Result<Option<Association>, StoreError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(sqlx_error)?;
        let removed = sqlx::query(
            "DELETE FROM order_slots WHERE order_id = $1 RETURNING slot_id, price, expires_at",
        )
        .bind(order_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(sqlx_error)?;

        let Some(row) = removed else {
            tx.rollback().await.map_err(sqlx_error)?;
            return Ok(None);
        };
        if get::<DateTime<Utc>>(&row, "expires_at")? <= now {
            tx.commit().await.map_err(sqlx_error)?;
            return Ok(None);
        }
        let association = Association {
            slot_id: SlotId(get(&row, "slot_id")?),
            price: get(&row, "price")?,
        };

        sqlx::query(
            "UPDATE slot_loads SET load = GREATEST(load - $2, 0) WHERE slot_id = $1 AND expires_at > $3",
        )
        .bind(association.slot_id.0)
        .bind(association.price)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error)?;
        sqlx::query("DELETE FROM slot_orders WHERE slot_id = $1 AND order_id = $2")
            .bind(association.slot_id.0)
            .bind(order_id.0)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_error)?;
        tx.commit().await.map_err(sqlx_error)?;
        Ok(Some(association))
    }

    async fn read(&self, slot_id: SlotId) -> Result<SlotSnapshot, StoreError> {
        let now = self.clock.now();
        let mut snapshot = SlotSnapshot {
            slot_id,
            ..SlotSnapshot::default()
        };

        let load = sqlx::query(
            "SELECT load, start_time, end_time, max_capacity FROM slot_loads WHERE slot_id = $1 AND expires_at > $2",
        )
        .bind(slot_id.0)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error)?;
        if let Some(row) = load {
            snapshot.load = get(&row, "load")?;
            snapshot.info = Some(SlotInfo {
                start_time: get(&row, "start_time")?,
                end_time: get(&row, "end_time")?,
                max_capacity: get(&row, "max_capacity")?,
            });
            let members = sqlx::query(
                "SELECT order_id FROM slot_orders WHERE slot_id = $1 ORDER BY order_id",
            )
            .bind(slot_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error)?;
            snapshot.order_ids = members
                .iter()
                .map(|row| get::<Uuid>(row, "order_id").map(OrderId))
                .collect::<Result<_, _>>()?;
        }

        let flags = sqlx::query(
            "SELECT disabled_until, max_capacity, delivery_plan, pickup_plan FROM slot_flags WHERE slot_id = $1",
        )
        .bind(slot_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error)?;
        if let Some(row) = flags {
            snapshot.disabled = get::<Option<DateTime<Utc>>>(&row, "disabled_until")?
                .is_some_and(|until| until > now);
            snapshot.capacity_override = get(&row, "max_capacity")?;
            let delivery: Option<i64> = get(&row, "delivery_plan")?;
            let pickup: Option<i64> = get(&row, "pickup_plan")?;
            snapshot.plan = delivery.zip(pickup).map(|(delivery, pickup)| SlotPlan { delivery, pickup });
        }
        Ok(snapshot)
    }

    async fn slot_controls(&self, slot_id: SlotId) -> Result<SlotControls, StoreError> {
        let now = self.clock.now();
        let row = sqlx::query("SELECT disabled_until, max_capacity FROM slot_flags WHERE slot_id = $1")
            .bind(slot_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error)?;
        let Some(row) = row else {
            return Ok(SlotControls::default());
        };
        Ok(SlotControls {
            disabled: get::<Option<DateTime<Utc>>>(&row, "disabled_until")?
                .is_some_and(|until| until > now),
            capacity_override: get(&row, "max_capacity")?,
        })
    }

    async fn global_capacity(&self) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT value FROM slot_config WHERE key = $1")
            .bind(GLOBAL_CAPACITY_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error)?;
        row.map(|row| get(&row, "value")).transpose()
    }

    async fn set_global_capacity(&self, value: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO slot_config (key, value) VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(GLOBAL_CAPACITY_KEY)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error)?;
        Ok(())
    }

    async fn set_slot_disabled(
        &self,
        slot_id: SlotId,
        disabled: bool,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let until = disabled.then(|| self.clock.now() + ttl);
        sqlx::query(
            r"
            INSERT INTO slot_flags (slot_id, disabled_until) VALUES ($1, $2)
            ON CONFLICT (slot_id) DO UPDATE SET disabled_until = EXCLUDED.disabled_until
            ",
        )
        .bind(slot_id.0)
        .bind(until)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error)?;
        Ok(())
    }

    async fn set_slot_capacity(
        &self,
        slot_id: SlotId,
        value: Option<i64>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO slot_flags (slot_id, max_capacity) VALUES ($1, $2)
            ON CONFLICT (slot_id) DO UPDATE SET max_capacity = EXCLUDED.max_capacity
            ",
        )
        .bind(slot_id.0)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error)?;
        Ok(())
    }

    async fn set_slot_plan(&self, slot_id: SlotId, plan: SlotPlan) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO slot_flags (slot_id, delivery_plan, pickup_plan) VALUES ($1, $2, $3)
            ON CONFLICT (slot_id) DO UPDATE
                SET delivery_plan = EXCLUDED.delivery_plan, pickup_plan = EXCLUDED.pickup_plan
            ",
        )
        .bind(slot_id.0)
        .bind(plan.delivery)
        .bind(plan.pickup)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for PostgresStore {
    async fn association(&self, order_id: &OrderId) -> Result<Option<Association>, StoreError> {
        let row = sqlx::query(
            "SELECT slot_id, price FROM order_slots WHERE order_id = $1 AND expires_at > $2",
        )
        .bind(order_id.0)
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error)?;
        row.map(|row| {
            Ok(Association {
                slot_id: SlotId(get(&row, "slot_id")?),
                price: get(&row, "price")?,
            })
        })
        .transpose()
    }

    async fn restore_association(
        &self,
        order_id: &OrderId,
        association: Association,
        slot_end: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        sqlx::query(
            r"
            INSERT INTO order_slots (order_id, slot_id, price, expires_at) VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO UPDATE
                SET slot_id = EXCLUDED.slot_id, price = EXCLUDED.price, expires_at = EXCLUDED.expires_at
            ",
        )
        .bind(order_id.0)
        .bind(association.slot_id.0)
        .bind(association.price)
        .bind(self.retain_until(now, slot_end))
        .execute(&self.pool)
        .await
        .map_err(sqlx_error)?;
        Ok(())
    }

    async fn mark_pending(
        &self,
        order_id: &OrderId,
        visible_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO order_membership (order_id, state, visible_at) VALUES ($1, 'pending', $2)
            ON CONFLICT (order_id) DO UPDATE SET state = 'pending', visible_at = EXCLUDED.visible_at
            ",
        )
        .bind(order_id.0)
        .bind(visible_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error)?;
        Ok(())
    }

    async fn mark_active(&self, order_id: &OrderId) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO order_membership (order_id, state, visible_at) VALUES ($1, 'active', NULL)
            ON CONFLICT (order_id) DO UPDATE SET state = 'active', visible_at = NULL
            ",
        )
        .bind(order_id.0)
        .execute(&self.pool)
        .await
        .map_err(sqlx_error)?;
        Ok(())
    }

    async fn clear_membership(&self, order_id: &OrderId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM order_membership WHERE order_id = $1")
            .bind(order_id.0)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error)?;
        Ok(())
    }

    async fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>, StoreError> {
        let rows = sqlx::query(
            r"
            UPDATE order_membership SET state = 'active', visible_at = NULL
            WHERE state = 'pending' AND visible_at <= $1
            RETURNING order_id
            ",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error)?;
        rows.iter()
            .map(|row| get::<Uuid>(row, "order_id").map(OrderId))
            .collect()
    }

    async fn pending_orders(&self) -> Result<Vec<OrderId>, StoreError> {
        self.membership_of("pending").await
    }

    async fn active_orders(&self) -> Result<Vec<OrderId>, StoreError> {
        self.membership_of("active").await
    }
}
