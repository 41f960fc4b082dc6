//! Budget-aware suggestion engine
//!
//! Turns catalog rows into quantity-annotated suggestions. The gateway owns relevance
//! ranking; this module never reorders.

mod engine;
mod types;

pub use engine::SuggestionEngine;
pub use types::*;

/// Upper bound on the quantity suggested for any single item.
pub const MAX_SUGGESTED_QUANTITY: u32 = 3;
