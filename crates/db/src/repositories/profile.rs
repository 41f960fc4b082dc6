use sqlx::Row;

use kathir_core::domain::profile::UserProfile;
use kathir_core::domain::session::UserId;

use super::decode;
use super::{ProfileRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProfileRepository {
    pool: DbPool,
}

impl SqlProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProfileRepository for SqlProfileRepository {
    async fn find_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, RepositoryError> {
        let row = sqlx::query("SELECT display_name, loyalty_points FROM user_profiles WHERE id = ?")
            .bind(&user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let display_name: String = decode("display_name", row.try_get("display_name"))?;
        let loyalty_points: i64 = decode("loyalty_points", row.try_get("loyalty_points"))?;
        let loyalty_points = u32::try_from(loyalty_points).map_err(|_| {
            RepositoryError::Decode(format!("loyalty_points `{loyalty_points}` is out of range"))
        })?;

        Ok(Some(UserProfile { user_id: user_id.clone(), display_name, loyalty_points }))
    }
}
