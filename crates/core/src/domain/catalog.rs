use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MealId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestaurantId(pub String);

/// Canonical catalog categories. Free-text synonyms collapse onto these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MealCategory {
    Meals,
    Desserts,
    Beverages,
    Appetizers,
    Bakery,
}

impl MealCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meals => "Meals",
            Self::Desserts => "Desserts",
            Self::Beverages => "Beverages",
            Self::Appetizers => "Appetizers",
            Self::Bakery => "Bakery",
        }
    }

    /// Exact synonym lookup for a category argument ("dessert", "Drinks", "main course").
    pub fn from_synonym(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "meal" | "meals" | "main" | "mains" | "main course" | "main courses" | "seafood" => {
                Some(Self::Meals)
            }
            "dessert" | "desserts" | "sweet" | "sweets" => Some(Self::Desserts),
            "drink" | "drinks" | "beverage" | "beverages" => Some(Self::Beverages),
            "appetizer" | "appetizers" | "starter" | "starters" => Some(Self::Appetizers),
            "bakery" | "bread" | "pastry" | "pastries" => Some(Self::Bakery),
            _ => None,
        }
    }

    /// Keyword scan of a free-text query. Specific categories are checked before the
    /// generic "meal" keyword so "dessert meals" stays a dessert search.
    pub fn detect_in(text: &str) -> Option<Self> {
        let lower = text.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

        if has(&["dessert", "sweet"]) {
            Some(Self::Desserts)
        } else if has(&["drink", "beverage"]) {
            Some(Self::Beverages)
        } else if has(&["appetizer", "starter"]) {
            Some(Self::Appetizers)
        } else if has(&["bakery", "bread", "pastr"]) {
            Some(Self::Bakery)
        } else if has(&["meal", "main", "seafood"]) {
            Some(Self::Meals)
        } else {
            None
        }
    }
}

/// Maps a caller-supplied category onto its canonical name; unknown categories pass through trimmed.
pub fn normalize_category(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        MealCategory::from_synonym(trimmed)
            .map(|category| category.as_str().to_string())
            .unwrap_or_else(|| trimmed.to_string()),
    )
}

/// A normalized catalog row as returned by the catalog gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: MealId,
    pub title: String,
    pub category: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub effective_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub original_price: Decimal,
    pub restaurant_id: RestaurantId,
    pub restaurant_name: String,
    #[serde(default)]
    pub allergens: Vec<String>,
}

impl CatalogItem {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.effective_price.is_sign_negative() {
            return Err(DomainError::InvariantViolation(format!(
                "meal `{}` has a negative effective price",
                self.id.0
            )));
        }
        if self.effective_price > self.original_price {
            return Err(DomainError::InvariantViolation(format!(
                "meal `{}` effective price {} exceeds original price {}",
                self.id.0, self.effective_price, self.original_price
            )));
        }
        Ok(())
    }

    /// `round(100 * (original - effective) / original)`, only when the item is discounted.
    pub fn discount_pct(&self) -> Option<u32> {
        if self.original_price <= Decimal::ZERO || self.effective_price >= self.original_price {
            return None;
        }
        let pct = (self.original_price - self.effective_price)
            .checked_mul(Decimal::ONE_HUNDRED)?
            .checked_div(self.original_price)?;
        pct.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero).to_u32()
    }
}

/// Structured search criteria for the catalog gateway. `None` means unconstrained.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogQuery {
    pub query: Option<String>,
    pub category: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub max_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub min_price: Option<Decimal>,
    pub restaurant_id: Option<RestaurantId>,
    pub limit: u32,
}

pub const MAX_CATALOG_LIMIT: u32 = 50;

const FILLER_TERMS: &[&str] = &[
    "a", "an", "and", "any", "below", "cheap", "egp", "find", "for", "from", "get", "have", "less",
    "me", "some", "show", "than", "the", "under", "want", "with",
];

impl CatalogQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_CATALOG_LIMIT)
    }

    /// Lowercased search terms of the free-text query. Filler words and bare numbers are
    /// dropped; an item matches when any remaining term hits its title, description, or category.
    pub fn terms(&self) -> Vec<String> {
        let Some(query) = self.query.as_deref() else {
            return Vec::new();
        };
        query
            .split(|ch: char| !ch.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|term| term.chars().count() >= 2)
            .filter(|term| !term.chars().all(|ch| ch.is_ascii_digit()))
            .filter(|term| !FILLER_TERMS.contains(&term.as_str()))
            .collect()
    }
}
