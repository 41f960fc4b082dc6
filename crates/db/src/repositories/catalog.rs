use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use kathir_core::domain::catalog::{CatalogItem, CatalogQuery, MealId, RestaurantId};

use super::{decode, format_timestamp, parse_decimal};
use super::{CatalogGateway, RepositoryError};
use crate::DbPool;

pub struct SqlCatalogGateway {
    pool: DbPool,
}

impl SqlCatalogGateway {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn catalog_item_from_row(row: &SqliteRow) -> Result<CatalogItem, RepositoryError> {
    let id: String = decode("id", row.try_get("id"))?;
    let title: String = decode("title", row.try_get("title"))?;
    let category: Option<String> = decode("category", row.try_get("category"))?;
    let discounted_price: String = decode("discounted_price", row.try_get("discounted_price"))?;
    let original_price: String = decode("original_price", row.try_get("original_price"))?;
    let restaurant_id: String = decode("restaurant_id", row.try_get("restaurant_id"))?;
    let restaurant_name: String = decode("restaurant_name", row.try_get("restaurant_name"))?;
    let allergens_json: String = decode("allergens_json", row.try_get("allergens_json"))?;

    let allergens = serde_json::from_str::<Vec<String>>(&allergens_json)
        .map_err(|error| RepositoryError::Decode(format!("allergens_json: {error}")))?;

    Ok(CatalogItem {
        id: MealId(id),
        title,
        category,
        effective_price: parse_decimal("discounted_price", &discounted_price)?,
        original_price: parse_decimal("original_price", &original_price)?,
        restaurant_id: RestaurantId(restaurant_id),
        restaurant_name,
        allergens,
    })
}

fn push_price_bound(
    builder: &mut QueryBuilder<'_, Sqlite>,
    operator: &str,
    bound: Option<rust_decimal::Decimal>,
) {
    if let Some(value) = bound.and_then(|bound| bound.to_f64()) {
        builder.push(format!(" AND CAST(m.discounted_price AS REAL) {operator} "));
        builder.push_bind(value);
    }
}

#[async_trait::async_trait]
impl CatalogGateway for SqlCatalogGateway {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogItem>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT m.id, m.title, m.category, m.discounted_price, m.original_price,
                    m.restaurant_id, r.restaurant_name, m.allergens_json
             FROM meals m
             JOIN restaurants r ON r.id = m.restaurant_id
             WHERE m.status = 'active'
               AND m.quantity_available > 0
               AND (m.expiry_date IS NULL OR m.expiry_date > ",
        );
        builder.push_bind(format_timestamp(&Utc::now()));
        builder.push(")");

        let terms = query.terms();
        if !terms.is_empty() {
            builder.push(" AND (");
            let mut separated = builder.separated(" OR ");
            for term in terms {
                let pattern = format!("%{term}%");
                separated.push("LOWER(m.title) LIKE ");
                separated.push_bind_unseparated(pattern.clone());
                separated.push("LOWER(IFNULL(m.description, '')) LIKE ");
                separated.push_bind_unseparated(pattern.clone());
                separated.push("LOWER(IFNULL(m.category, '')) LIKE ");
                separated.push_bind_unseparated(pattern);
            }
            builder.push(")");
        }

        if let Some(category) = query.category.as_deref().filter(|value| !value.trim().is_empty()) {
            builder.push(" AND LOWER(m.category) = LOWER(");
            builder.push_bind(category.trim().to_string());
            builder.push(")");
        }

        push_price_bound(&mut builder, "<=", query.max_price);
        push_price_bound(&mut builder, ">=", query.min_price);

        if let Some(restaurant_id) = &query.restaurant_id {
            builder.push(" AND m.restaurant_id = ");
            builder.push_bind(restaurant_id.0.clone());
        }

        builder.push(" ORDER BY CAST(m.discounted_price AS REAL) ASC, m.title ASC LIMIT ");
        builder.push_bind(i64::from(query.effective_limit()));

        let rows = builder.build().fetch_all(&self.pool).await?;
        let items = rows.iter().map(catalog_item_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(retain_consistently_priced(items))
    }
}

/// Drops rows whose effective price is negative or above the original price.
fn retain_consistently_priced(items: Vec<CatalogItem>) -> Vec<CatalogItem> {
    items
        .into_iter()
        .filter(|item| match item.validate() {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    event_name = "db.catalog.inconsistent_price",
                    meal_id = %item.id.0,
                    error = %error,
                    "skipping meal with inconsistent pricing"
                );
                false
            }
        })
        .collect()
}
