//! Types for the Suggestion Engine

use serde::{Deserialize, Serialize};

use crate::domain::catalog::CatalogItem;

/// A catalog item annotated with a suggested quantity and a human-readable reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// The underlying catalog row, flattened into the wire shape
    #[serde(flatten)]
    pub item: CatalogItem,
    /// Always within `1..=MAX_SUGGESTED_QUANTITY`
    pub suggested_quantity: u32,
    /// Title, restaurant and, for discounted items, the discount percentage
    pub reason: String,
}
