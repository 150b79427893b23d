//! In-memory order store for tests and single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{Admission, InFlightOrder, OrderId, OrderStatus, OrderStore, StoreError};

/// Order records keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<OrderId, InFlightOrder>>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an order record.
    pub fn insert(&self, order: InFlightOrder) {
        self.orders.lock().insert(order.order_id, order);
    }

    /// Change an order's status. Returns `false` for unknown orders.
    pub fn set_status(&self, order_id: &OrderId, status: OrderStatus) -> bool {
        self.orders
            .lock()
            .get_mut(order_id)
            .map(|order| order.status = status)
            .is_some()
    }

    /// Current record of an order.
    pub fn get(&self, order_id: &OrderId) -> Option<InFlightOrder> {
        self.orders.lock().get(order_id).cloned()
    }

    /// Number of stored orders, terminal ones included.
    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    /// Whether no order has been stored.
    pub fn is_empty(&self) -> bool {
        self.orders.lock().is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn list_in_flight(&self) -> Result<Vec<InFlightOrder>, StoreError> {
        let mut orders: Vec<InFlightOrder> = self
            .orders
            .lock()
            .values()
            .filter(|order| !order.status.is_terminal())
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.order_id);
        Ok(orders)
    }

    async fn persist_assignment(&self, admission: &Admission) -> Result<(), StoreError> {
        let mut orders = self.orders.lock();
        let order = orders
            .entry(admission.order_id)
            .or_insert_with(|| InFlightOrder {
                order_id: admission.order_id,
                status: OrderStatus::Scheduled,
                value: admission.reserved_value,
                slot_id: None,
                visible_at: None,
            });
        order.value = admission.reserved_value;
        order.slot_id = Some(admission.slot_id);
        order.visible_at = Some(admission.visible_at);
        Ok(())
    }
}
