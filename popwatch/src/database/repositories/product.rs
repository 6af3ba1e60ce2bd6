//! Product repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::begin_immediate;
use crate::database::models::{PriceHistoryDbModel, ProductDbModel, StockHistoryDbModel};
use crate::domain::ProductState;

const UPSERT_PRODUCT: &str = r#"
    INSERT INTO products (
        id, name, price, discount_price, in_stock, stock_quantity, is_new, is_limited,
        currency, product_url, image_url, brand_name, series, first_seen_at, last_checked_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        price = excluded.price,
        discount_price = excluded.discount_price,
        in_stock = excluded.in_stock,
        stock_quantity = excluded.stock_quantity,
        is_new = excluded.is_new,
        is_limited = excluded.is_limited,
        currency = excluded.currency,
        product_url = excluded.product_url,
        image_url = excluded.image_url,
        brand_name = excluded.brand_name,
        series = excluded.series,
        last_checked_at = excluded.last_checked_at
"#;

const INSERT_PRICE_HISTORY: &str = r#"
    INSERT INTO price_history (product_id, old_price, new_price, recorded_at)
    VALUES (?, ?, ?, ?)
"#;

const INSERT_STOCK_HISTORY: &str = r#"
    INSERT INTO stock_history (
        product_id, old_in_stock, new_in_stock, old_quantity, new_quantity, recorded_at
    ) VALUES (?, ?, ?, ?, ?, ?)
"#;

/// Persistence boundary of the update pipeline.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get_state(&self, id: &str) -> Result<Option<ProductState>>;
    async fn put_state(&self, state: &ProductState) -> Result<()>;
    async fn append_price_history(&self, entry: &PriceHistoryDbModel) -> Result<()>;
    async fn append_stock_history(&self, entry: &StockHistoryDbModel) -> Result<()>;

    /// Products ordered by most recently checked.
    async fn list_products(&self, offset: i64, limit: i64) -> Result<Vec<ProductState>>;
    async fn count_products(&self) -> Result<i64>;

    /// Newest first.
    async fn price_history(&self, product_id: &str, limit: i64)
    -> Result<Vec<PriceHistoryDbModel>>;
    /// Newest first.
    async fn stock_history(&self, product_id: &str, limit: i64)
    -> Result<Vec<StockHistoryDbModel>>;

    /// Store the new state of one product together with its history rows.
    async fn record_observation(
        &self,
        state: &ProductState,
        price: Option<&PriceHistoryDbModel>,
        stock: Option<&StockHistoryDbModel>,
    ) -> Result<()> {
        self.put_state(state).await?;
        if let Some(entry) = price {
            self.append_price_history(entry).await?;
        }
        if let Some(entry) = stock {
            self.append_stock_history(entry).await?;
        }
        Ok(())
    }
}

/// SQLx implementation of ProductRepository.
pub struct SqlxProductRepository {
    pool: SqlitePool,
    write_pool: SqlitePool,
}

impl SqlxProductRepository {
    pub fn new(pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { pool, write_pool }
    }
}

fn bind_product<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    model: &'q ProductDbModel,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&model.id)
        .bind(&model.name)
        .bind(model.price)
        .bind(model.discount_price)
        .bind(model.in_stock)
        .bind(model.stock_quantity)
        .bind(model.is_new)
        .bind(model.is_limited)
        .bind(&model.currency)
        .bind(&model.product_url)
        .bind(&model.image_url)
        .bind(&model.brand_name)
        .bind(&model.series)
        .bind(model.first_seen_at)
        .bind(model.last_checked_at)
}

#[async_trait]
impl ProductRepository for SqlxProductRepository {
    async fn get_state(&self, id: &str) -> Result<Option<ProductState>> {
        let model = sqlx::query_as::<_, ProductDbModel>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(model.map(ProductState::from))
    }

    async fn put_state(&self, state: &ProductState) -> Result<()> {
        let model = ProductDbModel::from(state);
        bind_product(sqlx::query(UPSERT_PRODUCT), &model)
            .execute(&self.write_pool)
            .await?;
        Ok(())
    }

    async fn append_price_history(&self, entry: &PriceHistoryDbModel) -> Result<()> {
        sqlx::query(INSERT_PRICE_HISTORY)
            .bind(&entry.product_id)
            .bind(entry.old_price)
            .bind(entry.new_price)
            .bind(entry.recorded_at)
            .execute(&self.write_pool)
            .await?;
        Ok(())
    }

    async fn append_stock_history(&self, entry: &StockHistoryDbModel) -> Result<()> {
        sqlx::query(INSERT_STOCK_HISTORY)
            .bind(&entry.product_id)
            .bind(entry.old_in_stock)
            .bind(entry.new_in_stock)
            .bind(entry.old_quantity)
            .bind(entry.new_quantity)
            .bind(entry.recorded_at)
            .execute(&self.write_pool)
            .await?;
        Ok(())
    }

    async fn list_products(&self, offset: i64, limit: i64) -> Result<Vec<ProductState>> {
        let models = sqlx::query_as::<_, ProductDbModel>(
            "SELECT * FROM products ORDER BY last_checked_at DESC, id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(models.into_iter().map(ProductState::from).collect())
    }

    async fn count_products(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn price_history(
        &self,
        product_id: &str,
        limit: i64,
    ) -> Result<Vec<PriceHistoryDbModel>> {
        let rows = sqlx::query_as::<_, PriceHistoryDbModel>(
            "SELECT * FROM price_history WHERE product_id = ? ORDER BY recorded_at DESC, id DESC LIMIT ?",
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn stock_history(
        &self,
        product_id: &str,
        limit: i64,
    ) -> Result<Vec<StockHistoryDbModel>> {
        let rows = sqlx::query_as::<_, StockHistoryDbModel>(
            "SELECT * FROM stock_history WHERE product_id = ? ORDER BY recorded_at DESC, id DESC LIMIT ?",
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// One `BEGIN IMMEDIATE` transaction per product.
    async fn record_observation(
        &self,
        state: &ProductState,
        price: Option<&PriceHistoryDbModel>,
        stock: Option<&StockHistoryDbModel>,
    ) -> Result<()> {
        let model = ProductDbModel::from(state);
        let mut tx = begin_immediate(&self.write_pool).await?;

        let result: Result<()> = async {
            bind_product(sqlx::query(UPSERT_PRODUCT), &model)
                .execute(&mut *tx)
                .await?;

            if let Some(entry) = price {
                sqlx::query(INSERT_PRICE_HISTORY)
                    .bind(&entry.product_id)
                    .bind(entry.old_price)
                    .bind(entry.new_price)
                    .bind(entry.recorded_at)
                    .execute(&mut *tx)
                    .await?;
            }

            if let Some(entry) = stock {
                sqlx::query(INSERT_STOCK_HISTORY)
                    .bind(&entry.product_id)
                    .bind(entry.old_in_stock)
                    .bind(entry.new_in_stock)
                    .bind(entry.old_quantity)
                    .bind(entry.new_quantity)
                    .bind(entry.recorded_at)
                    .execute(&mut *tx)
                    .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }
}
