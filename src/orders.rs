//! Staff order view.
//!
//! Loads the canonical order list from the backend, patches delivery status
//! from the local override cache, and keeps the list partitioned so that
//! delivered orders sit below everything still pending. Marking an order
//! delivered writes through to the cache; the backend is expected to catch
//! up on its own.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::OrderBackend;
use crate::error::{FetchError, StoreError};
use crate::models::{Order, OrderStatus};
use crate::storage::{self, KeyValueStore};

/// Key holding the `{order id: status}` override map.
pub const STATUS_OVERRIDES_KEY: &str = "orderStatuses";

// ---------------------------------------------------------------------------
// Pure reconciliation helpers
// ---------------------------------------------------------------------------

/// Effective status of an order given its backend status and the cached
/// override, if any. A cached `Delivered` always wins; nothing in the cache
/// can take an order back to pending.
pub fn merge_status(server: OrderStatus, cached: Option<OrderStatus>) -> OrderStatus {
    match cached {
        Some(OrderStatus::Delivered) => OrderStatus::Delivered,
        _ => server,
    }
}

/// Stable partition: non-delivered first, delivered after, original relative
/// order kept inside each group.
pub fn partition_by_status(orders: &mut [Order]) {
    // sort_by_key is stable.
    orders.sort_by_key(Order::is_delivered);
}

/// Local patch layer over backend status. Only ever records `Delivered`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusOverrides {
    entries: BTreeMap<String, OrderStatus>,
}

impl StatusOverrides {
    /// Read the override map. Entries that are not `Delivered` are dropped.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self, StoreError> {
        let raw: BTreeMap<String, OrderStatus> =
            storage::get_json(store, STATUS_OVERRIDES_KEY)?.unwrap_or_default();
        let entries = raw
            .into_iter()
            .filter(|(_, status)| status.is_delivered())
            .collect();
        Ok(StatusOverrides { entries })
    }

    pub fn get(&self, order_id: &str) -> Option<OrderStatus> {
        self.entries.get(order_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-modify-write a single `Delivered` mark, keeping every other
    /// entry already in the store. Last writer wins across clients.
    pub fn record_delivered(store: &dyn KeyValueStore, order_id: &str) -> Result<(), StoreError> {
        let mut current: BTreeMap<String, serde_json::Value> =
            storage::get_json(store, STATUS_OVERRIDES_KEY)?.unwrap_or_default();
        current.insert(
            order_id.to_string(),
            serde_json::Value::String(OrderStatus::Delivered.as_str().to_string()),
        );
        storage::set_json(store, STATUS_OVERRIDES_KEY, &current)
    }

    /// Apply the overrides to a freshly fetched list.
    pub fn apply(&self, orders: &mut [Order]) {
        for order in orders.iter_mut() {
            order.status = merge_status(order.status, self.get(&order.id));
        }
    }
}

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

/// One displayed row. `serial` follows the direction so a row keeps its
/// number when the list is flipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRow<'a> {
    pub serial: usize,
    pub order: &'a Order,
}

pub struct OrderReconciler {
    backend: Arc<dyn OrderBackend>,
    overrides: Arc<dyn KeyValueStore>,
    orders: Vec<Order>,
    reversed: bool,
    state: LoadState,
}

impl OrderReconciler {
    pub fn new(backend: Arc<dyn OrderBackend>, overrides: Arc<dyn KeyValueStore>) -> Self {
        OrderReconciler {
            backend,
            overrides,
            orders: Vec::new(),
            reversed: false,
            state: LoadState::Loading,
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Fetch, merge with the override cache and partition. A fetch failure
    /// is terminal for this load; nothing is retried.
    pub async fn load_orders(&mut self) -> Result<Vec<Order>, FetchError> {
        self.state = LoadState::Loading;
        let mut orders = match self.backend.fetch_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                error!(error = %e, "failed to fetch orders");
                self.state = LoadState::Failed(e.to_string());
                return Err(e);
            }
        };

        // An unreadable cache must not hide the order list.
        let overrides = StatusOverrides::load(self.overrides.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable status override cache");
            StatusOverrides::default()
        });
        overrides.apply(&mut orders);
        partition_by_status(&mut orders);

        info!(
            count = orders.len(),
            overrides = overrides.len(),
            "orders loaded"
        );
        self.orders = orders;
        self.state = LoadState::Ready;
        Ok(self.displayed())
    }

    /// Mark an order delivered. Idempotent: an already-delivered or unknown
    /// order leaves both the list and the cache untouched.
    pub fn mark_delivered(&mut self, order_id: &str) -> Result<Vec<Order>, StoreError> {
        let Some(order) = self.orders.iter_mut().find(|o| o.id == order_id) else {
            warn!(order_id, "mark delivered: order not in view");
            return Ok(self.displayed());
        };
        if order.is_delivered() {
            return Ok(self.displayed());
        }

        StatusOverrides::record_delivered(self.overrides.as_ref(), order_id)?;
        order.status = OrderStatus::Delivered;
        partition_by_status(&mut self.orders);

        info!(order_id, "order marked delivered");
        Ok(self.displayed())
    }

    /// Flip the display direction. Order data and the cache are untouched.
    pub fn toggle_display_direction(&mut self) -> Vec<Order> {
        self.reversed = !self.reversed;
        self.displayed()
    }

    /// The partitioned list in the current display direction.
    pub fn displayed(&self) -> Vec<Order> {
        if self.reversed {
            self.orders.iter().rev().cloned().collect()
        } else {
            self.orders.clone()
        }
    }

    pub fn rows(&self) -> Vec<DisplayRow<'_>> {
        let n = self.orders.len();
        if self.reversed {
            self.orders
                .iter()
                .rev()
                .enumerate()
                .map(|(i, order)| DisplayRow {
                    serial: n - i,
                    order,
                })
                .collect()
        } else {
            self.orders
                .iter()
                .enumerate()
                .map(|(i, order)| DisplayRow {
                    serial: i + 1,
                    order,
                })
                .collect()
        }
    }
}
