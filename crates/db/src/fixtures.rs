use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_RESTAURANT_IDS: &[&str] =
    &["rest-abou-tarek", "rest-zooba", "rest-el-abd", "rest-cilantro"];

/// Meals a shopper can actually buy from the seed. Sold-out and expired rows are seeded too
/// but never returned by catalog searches.
const SEED_AVAILABLE_MEAL_IDS: &[&str] = &[
    "meal-koshari",
    "meal-hawawshi",
    "meal-taameya",
    "meal-fish-tagine",
    "meal-basbousa",
    "meal-konafa",
    "meal-croissant-box",
    "meal-mango-juice",
    "meal-iced-latte",
];

const SEED_UNAVAILABLE_MEAL_IDS: &[&str] = &["meal-sambousek", "meal-yesterday-bread"];

const SEED_ORDER_IDS: &[&str] = &["order-demo-1", "order-demo-2"];

const SEED_CART_IDS: &[&str] = &["cart-demo-1", "cart-demo-2"];

const SEED_PROFILE_IDS: &[&str] = &[DEMO_USER_ID];

pub const DEMO_USER_ID: &str = "demo-user";

/// Demo catalog: four restaurants, a spread of categories and prices, plus a profile, order
/// history and a two-line cart for [`DEMO_USER_ID`].
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(SeedResult {
            restaurants: SEED_RESTAURANT_IDS.len(),
            meals: SEED_AVAILABLE_MEAL_IDS.len() + SEED_UNAVAILABLE_MEAL_IDS.len(),
            available_meals: SEED_AVAILABLE_MEAL_IDS.len(),
            demo_user: DEMO_USER_ID,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let checks = vec![
            ("restaurants", count_ids(pool, "restaurants", SEED_RESTAURANT_IDS).await?),
            ("available-meals", count_ids(pool, "meals", SEED_AVAILABLE_MEAL_IDS).await?),
            ("unavailable-meals", count_ids(pool, "meals", SEED_UNAVAILABLE_MEAL_IDS).await?),
            ("orders", count_ids(pool, "orders", SEED_ORDER_IDS).await?),
            ("cart-items", count_ids(pool, "cart_items", SEED_CART_IDS).await?),
            ("user-profiles", count_ids(pool, "user_profiles", SEED_PROFILE_IDS).await?),
        ];
        let all_present = checks.iter().all(|(_, present)| *present);

        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let all_meals = [SEED_AVAILABLE_MEAL_IDS, SEED_UNAVAILABLE_MEAL_IDS].concat();
        for (table, ids) in [
            ("cart_items", SEED_CART_IDS),
            ("orders", SEED_ORDER_IDS),
            ("meals", all_meals.as_slice()),
            ("restaurants", SEED_RESTAURANT_IDS),
            ("user_profiles", SEED_PROFILE_IDS),
        ] {
            let quoted = sql_array_from_ids(ids);
            sqlx::query(&format!("DELETE FROM {table} WHERE id IN {quoted}"))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn count_ids(pool: &DbPool, table: &str, ids: &[&str]) -> Result<bool, RepositoryError> {
    let quoted = sql_array_from_ids(ids);
    let existing: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table} WHERE id IN {quoted}"))
            .fetch_one(pool)
            .await?;
    Ok(existing == ids.len() as i64)
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted =
        ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect::<Vec<_>>().join(", ");
    format!("({quoted})")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub restaurants: usize,
    pub meals: usize,
    pub available_meals: usize,
    pub demo_user: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
