use serde::{Deserialize, Serialize};

use crate::domain::session::UserId;

/// Shopper facts shown to the assistant alongside the session budget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub loyalty_points: u32,
}
