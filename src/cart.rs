//! Session-local cart. Lines are keyed by item name.

use tracing::debug;

use crate::error::CafeError;
use crate::models::{CartItem, MenuItem};

/// Most units of one item a single order may carry.
pub const MAX_LINE_QUANTITY: u32 = 99;

fn quantity_limit_error(name: &str) -> CafeError {
    CafeError::Validation(format!(
        "At most {MAX_LINE_QUANTITY} of {name} per order"
    ))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one unit. Out-of-stock items are rejected, as is a line already
    /// at [`MAX_LINE_QUANTITY`].
    pub fn add(&mut self, item: &MenuItem) -> Result<(), CafeError> {
        if !item.stock {
            return Err(CafeError::Validation(format!("{} is out of stock", item.name)));
        }
        match self.lines.iter_mut().find(|line| line.name == item.name) {
            Some(line) if line.quantity >= MAX_LINE_QUANTITY => {
                return Err(quantity_limit_error(&item.name));
            }
            Some(line) => line.quantity += 1,
            None => self.lines.push(CartItem {
                name: item.name.clone(),
                price: item.price,
                quantity: 1,
            }),
        }
        debug!(item = %item.name, "added to cart");
        Ok(())
    }

    pub fn remove(&mut self, name: &str) {
        self.lines.retain(|line| line.name != name);
    }

    /// Set a line's quantity. Zero or less removes the line; more than
    /// [`MAX_LINE_QUANTITY`] is rejected and leaves the line unchanged.
    pub fn update_quantity(&mut self, name: &str, quantity: i64) -> Result<(), CafeError> {
        if quantity <= 0 {
            self.remove(name);
            return Ok(());
        }
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q <= MAX_LINE_QUANTITY)
            .ok_or_else(|| quantity_limit_error(name))?;
        if let Some(line) = self.lines.iter_mut().find(|line| line.name == name) {
            line.quantity = quantity;
        }
        Ok(())
    }

    pub fn lines(&self) -> &[CartItem] {
        &self.lines
    }

    pub fn total_price(&self) -> i64 {
        self.lines
            .iter()
            .map(CartItem::line_total)
            .fold(0, i64::saturating_add)
    }

    /// Units across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu_item(name: &str, price: i64, stock: bool) -> MenuItem {
        MenuItem {
            name: name.into(),
            price,
            stock,
            category: None,
            creator: None,
        }
    }

    #[test]
    fn test_add_merges_lines() {
        let mut cart = Cart::new();
        let latte = menu_item("Latte", 450, true);
        cart.add(&latte).unwrap();
        cart.add(&latte).unwrap();
        cart.add(&menu_item("Toast", 300, true)).unwrap();

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].quantity, 2);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total_price(), 1200);
    }

    #[test]
    fn test_out_of_stock_rejected() {
        let mut cart = Cart::new();
        let err = cart.add(&menu_item("Cake", 500, false)).unwrap_err();
        assert!(matches!(err, CafeError::Validation(_)));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_quantity() {
        let mut cart = Cart::new();
        cart.add(&menu_item("Latte", 450, true)).unwrap();
        cart.add(&menu_item("Toast", 300, true)).unwrap();

        cart.update_quantity("Latte", 4).unwrap();
        assert_eq!(cart.total_price(), 450 * 4 + 300);

        cart.update_quantity("Toast", 0).unwrap();
        assert_eq!(cart.lines().len(), 1);
        cart.update_quantity("Latte", -1).unwrap();
        assert!(cart.is_empty());

        cart.update_quantity("Missing", 2).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_quantity_is_capped() {
        let mut cart = Cart::new();
        let latte = menu_item("Latte", 450, true);
        cart.add(&latte).unwrap();
        cart.add(&menu_item("Toast", 300, true)).unwrap();

        let err = cart
            .update_quantity("Latte", i64::from(u32::MAX))
            .unwrap_err();
        assert!(matches!(err, CafeError::Validation(_)));
        assert!(cart
            .update_quantity("Latte", i64::from(MAX_LINE_QUANTITY) + 1)
            .is_err());
        assert_eq!(cart.item_count(), 2);

        cart.update_quantity("Latte", i64::from(MAX_LINE_QUANTITY)).unwrap();
        assert!(matches!(cart.add(&latte), Err(CafeError::Validation(_))));
        assert_eq!(cart.item_count(), u64::from(MAX_LINE_QUANTITY) + 1);
    }

    #[test]
    fn test_huge_prices_saturate_instead_of_overflowing() {
        let mut cart = Cart::new();
        cart.add(&menu_item("Gold", i64::MAX / 2 + 1, true)).unwrap();
        cart.add(&menu_item("Gold", i64::MAX / 2 + 1, true)).unwrap();
        cart.add(&menu_item("Toast", 300, true)).unwrap();
        assert_eq!(cart.total_price(), i64::MAX);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cart = Cart::new();
        cart.add(&menu_item("Latte", 450, true)).unwrap();
        cart.add(&menu_item("Toast", 300, true)).unwrap();
        cart.remove("Latte");
        assert_eq!(cart.item_count(), 1);
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total_price(), 0);
    }
}
