use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::MealId;

/// One cart row joined with its meal and restaurant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub cart_item_id: String,
    pub meal_id: MealId,
    pub title: String,
    pub restaurant_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartLine {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartSummary {
    pub items: Vec<CartLine>,
    pub count: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl CartSummary {
    /// Total is the sum of quantity x unit effective price. An empty cart totals zero.
    pub fn from_lines(items: Vec<CartLine>) -> Self {
        let total = items.iter().map(CartLine::subtotal).sum();
        Self { count: items.len(), items, total }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CartLine, CartSummary};
    use crate::domain::catalog::MealId;

    fn line(id: &str, unit_price: Decimal, quantity: u32) -> CartLine {
        CartLine {
            cart_item_id: format!("cart-{id}"),
            meal_id: MealId(id.to_string()),
            title: format!("Meal {id}"),
            restaurant_name: "Zooba".to_string(),
            unit_price,
            quantity,
        }
    }

    #[test]
    fn empty_cart_is_a_valid_zero_summary() {
        let summary = CartSummary::from_lines(Vec::new());

        assert!(summary.items.is_empty());
        assert_eq!(summary.count, 0);
        assert_eq!(summary.total, Decimal::ZERO);
    }

    #[test]
    fn total_sums_quantity_times_unit_price() {
        let summary = CartSummary::from_lines(vec![
            line("a", Decimal::new(4550, 2), 2),
            line("b", Decimal::new(30, 0), 1),
        ]);

        assert_eq!(summary.count, 2);
        assert_eq!(summary.total, Decimal::new(12100, 2));
    }
}
