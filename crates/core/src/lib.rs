pub mod config;
pub mod domain;
pub mod errors;
pub mod suggestions;

pub use domain::cart::{CartLine, CartSummary};
pub use domain::catalog::{CatalogItem, CatalogQuery, MealCategory, MealId, RestaurantId};
pub use domain::order::{OrderId, OrderSummary};
pub use domain::profile::UserProfile;
pub use domain::session::{Session, SessionId, SessionStatus, UserId};
pub use domain::turn::{Turn, TurnId, TurnMetadata, TurnRole};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use suggestions::{Suggestion, SuggestionEngine};
