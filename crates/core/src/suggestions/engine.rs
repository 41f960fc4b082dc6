//! Suggestion Engine implementation

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::types::Suggestion;
use super::MAX_SUGGESTED_QUANTITY;
use crate::domain::catalog::CatalogItem;
use crate::domain::session::Session;

/// Pure annotation step between the catalog gateway and the caller.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionEngine {
    max_quantity: u32,
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self { max_quantity: MAX_SUGGESTED_QUANTITY }
    }
}

impl SuggestionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotate items in gateway order. Without a session budget every quantity is 1.
    pub fn annotate(&self, items: Vec<CatalogItem>, session: Option<&Session>) -> Vec<Suggestion> {
        let remaining = session.and_then(Session::remaining_budget);
        items
            .into_iter()
            .map(|item| {
                let suggested_quantity = self.suggested_quantity(&item, remaining);
                let reason = reason_for(&item);
                Suggestion { item, suggested_quantity, reason }
            })
            .collect()
    }

    fn suggested_quantity(&self, item: &CatalogItem, remaining: Option<Decimal>) -> u32 {
        let Some(remaining) = remaining else {
            return 1;
        };
        if remaining <= Decimal::ZERO {
            return 1;
        }
        if item.effective_price <= Decimal::ZERO {
            return self.max_quantity;
        }

        // A quotient outside Decimal's range is far above the cap anyway.
        let affordable = match remaining.checked_div(item.effective_price) {
            Some(quotient) => quotient.floor().to_u32().unwrap_or(self.max_quantity),
            None => self.max_quantity,
        };
        affordable.clamp(1, self.max_quantity)
    }
}

fn reason_for(item: &CatalogItem) -> String {
    let mut reason = format!("{} from {}", item.title, item.restaurant_name);
    if let Some(discount) = item.discount_pct() {
        reason.push_str(&format!(" ({discount}% off)"));
    }
    reason
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::catalog::{CatalogItem, MealId, RestaurantId};
    use crate::domain::session::{Session, UserId};
    use crate::suggestions::{SuggestionEngine, MAX_SUGGESTED_QUANTITY};

    fn item(id: &str, effective: Decimal, original: Decimal) -> CatalogItem {
        CatalogItem {
            id: MealId(id.to_string()),
            title: format!("Meal {id}"),
            category: Some("Meals".to_string()),
            effective_price: effective,
            original_price: original,
            restaurant_id: RestaurantId("rest-1".to_string()),
            restaurant_name: "Gad".to_string(),
            allergens: Vec::new(),
        }
    }

    fn budget_session(limit: i64, spend: i64) -> Session {
        let mut session = Session::open(UserId("user-1".to_string()));
        session.set_budget(Decimal::new(limit, 0)).expect("set budget");
        session.record_spend(Decimal::new(spend, 0)).expect("record spend");
        session
    }

    #[test]
    fn quantity_is_capped_by_remaining_budget_and_fixed_cap() {
        // remaining 150 at 40 each -> floor(3.75) = 3
        let session = budget_session(200, 50);
        let suggestions = SuggestionEngine::new()
            .annotate(vec![item("a", Decimal::new(40, 0), Decimal::new(40, 0))], Some(&session));

        assert_eq!(suggestions[0].suggested_quantity, 3);
    }

    #[test]
    fn quantity_follows_budget_below_the_cap() {
        // remaining 100 at 45 each -> 2
        let session = budget_session(100, 0);
        let suggestions = SuggestionEngine::new()
            .annotate(vec![item("a", Decimal::new(45, 0), Decimal::new(60, 0))], Some(&session));

        assert_eq!(suggestions[0].suggested_quantity, 2);
    }

    #[test]
    fn quantity_defaults_to_one_without_budget_or_when_exhausted() {
        let items = vec![
            item("cheap", Decimal::new(5, 0), Decimal::new(5, 0)),
            item("pricey", Decimal::new(500, 0), Decimal::new(500, 0)),
        ];
        let engine = SuggestionEngine::new();

        let unconstrained = Session::open(UserId("user-1".to_string()));
        for suggestion in engine.annotate(items.clone(), Some(&unconstrained)) {
            assert_eq!(suggestion.suggested_quantity, 1);
        }
        for suggestion in engine.annotate(items.clone(), None) {
            assert_eq!(suggestion.suggested_quantity, 1);
        }

        let exhausted = budget_session(100, 100);
        for suggestion in engine.annotate(items, Some(&exhausted)) {
            assert_eq!(suggestion.suggested_quantity, 1);
        }
    }

    #[test]
    fn quantity_stays_within_bounds_across_prices() {
        let session = budget_session(120, 7);
        let engine = SuggestionEngine::new();
        let items = (1..=60)
            .map(|price| item(&format!("m{price}"), Decimal::new(price * 5, 1), Decimal::new(100, 0)))
            .collect::<Vec<_>>();

        for suggestion in engine.annotate(items, Some(&session)) {
            assert!(suggestion.suggested_quantity >= 1);
            assert!(suggestion.suggested_quantity <= MAX_SUGGESTED_QUANTITY);
        }
    }

    #[test]
    fn reason_names_title_restaurant_and_discount() {
        let suggestions = SuggestionEngine::new().annotate(
            vec![
                item("a", Decimal::new(30, 0), Decimal::new(40, 0)),
                item("b", Decimal::new(40, 0), Decimal::new(40, 0)),
            ],
            None,
        );

        assert_eq!(suggestions[0].reason, "Meal a from Gad (25% off)");
        assert_eq!(suggestions[1].reason, "Meal b from Gad");
    }

    #[test]
    fn output_preserves_gateway_order() {
        let ids = ["z", "a", "m"];
        let items = ids
            .iter()
            .map(|id| item(id, Decimal::new(10, 0), Decimal::new(10, 0)))
            .collect::<Vec<_>>();

        let suggestions = SuggestionEngine::new().annotate(items, None);
        let out = suggestions.iter().map(|s| s.item.id.0.as_str()).collect::<Vec<_>>();

        assert_eq!(out, ids);
    }

    #[test]
    fn tiny_prices_against_large_budgets_hit_the_cap() {
        // 1_000_000 / 1e-27 does not fit in a Decimal
        let session = budget_session(1_000_000, 0);
        let tiny = Decimal::new(1, 27);
        let suggestions =
            SuggestionEngine::new().annotate(vec![item("crumb", tiny, tiny)], Some(&session));

        assert_eq!(suggestions[0].suggested_quantity, MAX_SUGGESTED_QUANTITY);
        assert_eq!(suggestions[0].reason, "Meal crumb from Gad");
    }
}
