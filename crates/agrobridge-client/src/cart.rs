use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use agrobridge_core::ProductId;

use crate::identity::Identify;
use crate::location::CartClearer;

/// In-memory buyer cart: quantity per product identity.
#[derive(Debug, Default)]
pub struct LocalCart {
    lines: Mutex<HashMap<ProductId, u32>>,
}

impl LocalCart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lines(&self) -> MutexGuard<'_, HashMap<ProductId, u32>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `quantity` units of `product`; returns the new quantity.
    /// Adding zero is a no-op.
    pub fn add(&self, product: &impl Identify, quantity: u32) -> u32 {
        let mut lines = self.lines();
        if quantity == 0 {
            return lines.get(product.product_id()).copied().unwrap_or(0);
        }
        let line = lines.entry(product.product_id().clone()).or_insert(0);
        *line = line.saturating_add(quantity);
        *line
    }

    /// Drops the line for `id`. Returns the quantity it held.
    pub fn remove(&self, id: &ProductId) -> Option<u32> {
        self.lines().remove(id)
    }

    #[must_use]
    pub fn quantity(&self, id: &ProductId) -> u32 {
        self.lines().get(id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }

    pub fn clear(&self) {
        self.lines().clear();
    }
}

impl CartClearer for LocalCart {
    fn clear_cart(&self) {
        let dropped = {
            let mut lines = self.lines();
            let n = lines.len();
            lines.clear();
            n
        };
        tracing::info!(lines = dropped, "cart cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> ProductId {
        ProductId::new(raw)
    }

    #[test]
    fn add_accumulates_per_identity() {
        let cart = LocalCart::new();
        assert_eq!(cart.add(&id("mango"), 2), 2);
        assert_eq!(cart.add(&id("mango"), 3), 5);
        assert_eq!(cart.add(&id("toor-dal"), 1), 1);

        assert_eq!(cart.len(), 2);
        assert_eq!(cart.quantity(&id("mango")), 5);
        assert_eq!(cart.quantity(&id("ghee")), 0);
    }

    #[test]
    fn adding_zero_creates_no_line() {
        let cart = LocalCart::new();
        assert_eq!(cart.add(&id("mango"), 0), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn remove_returns_previous_quantity() {
        let cart = LocalCart::new();
        cart.add(&id("mango"), 4);
        assert_eq!(cart.remove(&id("mango")), Some(4));
        assert_eq!(cart.remove(&id("mango")), None);
    }

    #[test]
    fn clear_cart_empties_everything() {
        let cart = LocalCart::new();
        cart.add(&id("mango"), 1);
        cart.add(&id("ghee"), 2);

        cart.clear_cart();
        assert!(cart.is_empty());
    }
}
