use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use kathir_core::domain::cart::CartLine;
use kathir_core::domain::catalog::MealId;
use kathir_core::domain::order::{OrderId, OrderSummary};
use kathir_core::domain::session::UserId;

use super::{decode, parse_decimal, parse_timestamp};
use super::{CartRepository, OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub struct SqlCartRepository {
    pool: DbPool,
}

impl SqlCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn order_from_row(row: &SqliteRow) -> Result<OrderSummary, RepositoryError> {
    let id: String = decode("id", row.try_get("id"))?;
    let user_id: String = decode("user_id", row.try_get("user_id"))?;
    let order_number: String = decode("order_number", row.try_get("order_number"))?;
    let total_amount: String = decode("total_amount", row.try_get("total_amount"))?;
    let status: String = decode("status", row.try_get("status"))?;
    let delivery_type: Option<String> = decode("delivery_type", row.try_get("delivery_type"))?;
    let restaurant_name: String = decode("restaurant_name", row.try_get("restaurant_name"))?;
    let created_at: String = decode("created_at", row.try_get("created_at"))?;

    Ok(OrderSummary {
        id: OrderId(id),
        user_id: UserId(user_id),
        order_number,
        total_amount: parse_decimal("total_amount", &total_amount)?,
        status,
        delivery_type,
        restaurant_name,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

fn cart_line_from_row(row: &SqliteRow) -> Result<CartLine, RepositoryError> {
    let cart_item_id: String = decode("id", row.try_get("id"))?;
    let meal_id: String = decode("meal_id", row.try_get("meal_id"))?;
    let title: String = decode("title", row.try_get("title"))?;
    let restaurant_name: String = decode("restaurant_name", row.try_get("restaurant_name"))?;
    let discounted_price: String = decode("discounted_price", row.try_get("discounted_price"))?;
    let quantity: i64 = decode("quantity", row.try_get("quantity"))?;

    let quantity = u32::try_from(quantity)
        .map_err(|_| RepositoryError::Decode(format!("quantity `{quantity}` is out of range")))?;

    Ok(CartLine {
        cart_item_id,
        meal_id: MealId(meal_id),
        title,
        restaurant_name,
        unit_price: parse_decimal("discounted_price", &discounted_price)?,
        quantity,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn recent_orders(
        &self,
        user_id: &UserId,
        limit: u32,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT o.id, o.user_id, o.order_number, o.total_amount, o.status, o.delivery_type,
                    o.created_at, r.restaurant_name
             FROM orders o
             JOIN restaurants r ON r.id = o.restaurant_id
             WHERE o.user_id = ?
             ORDER BY o.created_at DESC, o.rowid DESC
             LIMIT ?",
        )
        .bind(&user_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_from_row).collect()
    }
}

#[async_trait::async_trait]
impl CartRepository for SqlCartRepository {
    async fn cart_lines(&self, user_id: &UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT c.id, c.meal_id, c.quantity, m.title, m.discounted_price, r.restaurant_name
             FROM cart_items c
             JOIN meals m ON m.id = c.meal_id
             JOIN restaurants r ON r.id = m.restaurant_id
             WHERE c.user_id = ?
             ORDER BY c.created_at ASC, c.rowid ASC",
        )
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(cart_line_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use kathir_core::domain::cart::CartSummary;
    use kathir_core::domain::session::UserId;

    use super::{SqlCartRepository, SqlOrderRepository};
    use crate::repositories::{CartRepository, OrderRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    const FIXTURE: &str = r#"
        INSERT INTO restaurants (id, restaurant_name, created_at) VALUES
            ('rest-1', 'Abou Tarek', '2026-01-01T00:00:00.000000000Z');

        INSERT INTO meals (id, restaurant_id, title, category, original_price, discounted_price,
                           quantity_available, created_at) VALUES
            ('koshari', 'rest-1', 'Koshari Bowl', 'Meals', '60.00', '40.00', 5,
             '2026-01-01T00:00:00.000000000Z'),
            ('basbousa', 'rest-1', 'Basbousa', 'Desserts', '30.00', '15.50', 3,
             '2026-01-01T00:00:00.000000000Z');

        INSERT INTO orders (id, user_id, restaurant_id, order_number, total_amount, status,
                            delivery_type, created_at) VALUES
            ('o-1', 'user-1', 'rest-1', 'KT-1001', '80.00', 'delivered', 'pickup',
             '2026-02-01T10:00:00.000000000Z'),
            ('o-2', 'user-1', 'rest-1', 'KT-1002', '40.00', 'pending', 'delivery',
             '2026-02-03T10:00:00.000000000Z'),
            ('o-3', 'user-1', 'rest-1', 'KT-1003', '15.50', 'cancelled', NULL,
             '2026-02-02T10:00:00.000000000Z'),
            ('o-4', 'user-2', 'rest-1', 'KT-2001', '99.00', 'delivered', NULL,
             '2026-02-04T10:00:00.000000000Z');

        INSERT INTO cart_items (id, user_id, meal_id, quantity, created_at) VALUES
            ('c-1', 'user-1', 'koshari', 2, '2026-02-05T10:00:00.000000000Z'),
            ('c-2', 'user-1', 'basbousa', 1, '2026-02-05T10:01:00.000000000Z');
    "#;

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        sqlx::raw_sql(FIXTURE).execute(&pool).await.expect("fixture");
        pool
    }

    #[tokio::test]
    async fn recent_orders_are_newest_first_and_limited() {
        let repo = SqlOrderRepository::new(pool().await);

        let orders = repo.recent_orders(&UserId("user-1".to_string()), 2).await.expect("orders");

        let numbers = orders.iter().map(|order| order.order_number.as_str()).collect::<Vec<_>>();
        assert_eq!(numbers, vec!["KT-1002", "KT-1003"]);
        assert_eq!(orders[0].restaurant_name, "Abou Tarek");
        assert_eq!(orders[0].delivery_type.as_deref(), Some("delivery"));
    }

    #[tokio::test]
    async fn cart_total_is_quantity_times_discounted_price() {
        let repo = SqlCartRepository::new(pool().await);

        let summary =
            CartSummary::from_lines(repo.cart_lines(&UserId("user-1".to_string())).await.expect("cart"));

        assert_eq!(summary.count, 2);
        assert_eq!(summary.items[0].title, "Koshari Bowl");
        assert_eq!(summary.total, Decimal::new(9550, 2));
    }

    #[tokio::test]
    async fn empty_cart_for_unknown_user() {
        let repo = SqlCartRepository::new(pool().await);

        let lines = repo.cart_lines(&UserId("nobody".to_string())).await.expect("cart");

        assert!(lines.is_empty());
    }
}
