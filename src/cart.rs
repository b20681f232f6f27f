//! Cart store adapter.
//!
//! The cart is owned by the menu screens; this module only reads the
//! serialized line items and clears them once an order is saved.

use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::models::LineItem;
use crate::storage::{self, KeyValueStore};

pub const CART_KEY: &str = "cartItems";

#[derive(Clone)]
pub struct CartStore {
    store: Arc<dyn KeyValueStore>,
}

impl CartStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        CartStore { store }
    }

    /// Current cart contents. A missing cart is empty; a corrupt one is
    /// treated as empty too, matching how the menu screens recover.
    pub fn load(&self) -> Vec<LineItem> {
        match storage::get_json::<Vec<LineItem>>(self.store.as_ref(), CART_KEY) {
            Ok(items) => items.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "cart contents unreadable, starting from an empty cart");
                Vec::new()
            }
        }
    }

    pub fn save(&self, items: &[LineItem]) -> Result<(), StoreError> {
        storage::set_json(self.store.as_ref(), CART_KEY, &items)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(CART_KEY)?;
        info!("cart cleared");
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.load().is_empty()
    }
}

/// Sum of `price × quantity`, rounded to paise. `None` on overflow.
pub fn cart_total(items: &[LineItem]) -> Option<Decimal> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.line_total()?))
        .map(|sum| sum.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}
