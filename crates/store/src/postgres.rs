use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    Money, NewOrder, NewOrderItem, NewProduct, NewVariant, Order, OrderId, OrderItem,
    OrderItemId, OrderStatus, PaymentMethod, Product, ProductId, UserId, Variant, VariantId,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, Row, postgres::PgRow};

use crate::{
    InventoryLedger, Reservation, Result, StoreError,
    store::{
        CatalogStore, FulfillmentStore, NotificationOutcome, OrderTransaction,
        PaymentNotificationRecord, StatusChange, validate_product,
    },
};

const PRODUCT_COLUMNS: &str = "id, name, base_price, size_threshold, size_surcharge_pct, \
     discount_pct, promo_start, promo_end, promo_name";

const VARIANT_COLUMNS: &str = "id, product_id, size_label, stock, sku";

const ORDER_COLUMNS: &str = "id, user_id, customer_name, customer_phone, shipping_address, \
     total_amount, shipping_fee, status, payment_method, note, audit_log, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, variant_id, quantity, price_at_purchase";

/// PostgreSQL-backed fulfillment store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn attach_items(&self, mut orders: Vec<Order>) -> Result<Vec<Order>> {
        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id ASC"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let item = row_to_item(&row)?;
            items.entry(item.order_id).or_default().push(item);
        }
        for order in &mut orders {
            order.items = items.remove(&order.id).unwrap_or_default();
        }
        Ok(orders)
    }

    async fn fetch_orders(
        &self,
        sql: &str,
        binds: &[i64],
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(*value);
        }
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        let orders = rows.iter().map(row_to_order).collect::<Result<Vec<_>>>()?;
        self.attach_items(orders).await
    }
}

fn invalid_row(e: impl std::fmt::Display) -> StoreError {
    StoreError::InvalidRow(e.to_string())
}

fn stock_from_db(stock: i64) -> Result<u32> {
    u32::try_from(stock).map_err(invalid_row)
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        base_price: Money::new(row.try_get("base_price")?),
        size_threshold: row.try_get("size_threshold")?,
        size_surcharge_pct: row
            .try_get::<Option<Decimal>, _>("size_surcharge_pct")?
            .map(|d| d.normalize()),
        discount_pct: row
            .try_get::<Option<Decimal>, _>("discount_pct")?
            .map(|d| d.normalize()),
        promo_start: row.try_get("promo_start")?,
        promo_end: row.try_get("promo_end")?,
        promo_name: row.try_get("promo_name")?,
    })
}

fn row_to_variant(row: &PgRow) -> Result<Variant> {
    Ok(Variant {
        id: VariantId::new(row.try_get("id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        size_label: row.try_get("size_label")?,
        stock: stock_from_db(row.try_get("stock")?)?,
        sku: row.try_get("sku")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let payment_method: String = row.try_get("payment_method")?;
    let audit_log: serde_json::Value = row.try_get("audit_log")?;

    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        customer_name: row.try_get("customer_name")?,
        customer_phone: row.try_get("customer_phone")?,
        shipping_address: row.try_get("shipping_address")?,
        total_amount: Money::new(row.try_get("total_amount")?),
        shipping_fee: Money::new(row.try_get("shipping_fee")?),
        status: status.parse::<OrderStatus>().map_err(invalid_row)?,
        payment_method: payment_method.parse::<PaymentMethod>().map_err(invalid_row)?,
        note: row.try_get("note")?,
        audit_log: serde_json::from_value(audit_log)?,
        items: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        variant_id: VariantId::new(row.try_get("variant_id")?),
        quantity: u32::try_from(row.try_get::<i64, _>("quantity")?).map_err(invalid_row)?,
        price_at_purchase: Money::new(row.try_get("price_at_purchase")?),
    })
}

fn row_to_notification(row: &PgRow) -> Result<PaymentNotificationRecord> {
    let outcome: String = row.try_get("outcome")?;
    Ok(PaymentNotificationRecord {
        received_at: row.try_get("received_at")?,
        transaction_id: row.try_get("transaction_id")?,
        description: row.try_get("description")?,
        amount: Money::new(row.try_get("amount")?),
        order_id: row.try_get::<Option<i64>, _>("order_id")?.map(OrderId::new),
        outcome: outcome.parse::<NotificationOutcome>().map_err(invalid_row)?,
        message: row.try_get("message")?,
    })
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        validate_product(&product)?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, base_price, size_threshold, size_surcharge_pct,
                                  discount_pct, promo_start, promo_end, promo_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(product.base_price.amount())
        .bind(&product.size_threshold)
        .bind(product.size_surcharge_pct)
        .bind(product.discount_pct)
        .bind(product.promo_start)
        .bind(product.promo_end)
        .bind(&product.promo_name)
        .fetch_one(&self.pool)
        .await?;

        row_to_product(&row)
    }

    async fn insert_variant(&self, variant: NewVariant) -> Result<Variant> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO product_variants (product_id, size_label, stock, sku)
            VALUES ($1, $2, $3, $4)
            RETURNING {VARIANT_COLUMNS}
            "#
        ))
        .bind(variant.product_id.as_i64())
        .bind(&variant.size_label)
        .bind(i64::from(variant.stock))
        .bind(&variant.sku)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row_to_variant(&row),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StoreError::ProductNotFound(variant.product_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn get_variant(&self, variant_id: VariantId) -> Result<Option<Variant>> {
        let row = sqlx::query(&format!(
            "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = $1"
        ))
        .bind(variant_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_variant).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn restock(&self, variant_id: VariantId, quantity: u32) -> Result<Variant> {
        let row = sqlx::query(&format!(
            "UPDATE product_variants SET stock = stock + $2 WHERE id = $1 RETURNING {VARIANT_COLUMNS}"
        ))
        .bind(variant_id.as_i64())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_variant(&row),
            None => Err(StoreError::VariantNotFound(variant_id)),
        }
    }
}

#[async_trait]
impl FulfillmentStore for PostgresStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx: Some(tx) })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let order = row_to_order(&row)?;
                Ok(self.attach_items(vec![order]).await?.pop())
            }
            None => Ok(None),
        }
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let sql = match status {
            Some(_) => format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 ORDER BY created_at DESC, id DESC"
            ),
            None => format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"),
        };
        self.fetch_orders(&sql, &[], status).await
    }

    async fn list_orders_for_user(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        let sql = match status {
            Some(_) => format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 AND status = $2 \
                 ORDER BY created_at DESC, id DESC"
            ),
            None => format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
            ),
        };
        self.fetch_orders(&sql, &[user_id.as_i64()], status).await
    }

    #[tracing::instrument(skip(self, change), fields(order_id = %change.order_id, next = %change.next))]
    async fn compare_and_set_status(&self, change: StatusChange) -> Result<Order> {
        let entry = serde_json::to_value(vec![&change.audit])?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = $3, updated_at = $4, audit_log = audit_log || $5
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(change.order_id.as_i64())
        .bind(change.expected.as_str())
        .bind(change.next.as_str())
        .bind(change.audit.timestamp)
        .bind(entry)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            let order = row_to_order(&row)?;
            return self
                .attach_items(vec![order])
                .await?
                .pop()
                .ok_or(StoreError::OrderNotFound(change.order_id));
        }

        // The guarded update matched nothing: tell a missing order apart from a lost race.
        let actual: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
            .bind(change.order_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        match actual {
            Some(actual) => Err(StoreError::StatusConflict {
                order_id: change.order_id,
                expected: change.expected,
                actual: actual.parse::<OrderStatus>().map_err(invalid_row)?,
            }),
            None => Err(StoreError::OrderNotFound(change.order_id)),
        }
    }

    async fn record_payment_notification(&self, record: PaymentNotificationRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_notifications
                (received_at, transaction_id, description, amount, order_id, outcome, message)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.received_at)
        .bind(&record.transaction_id)
        .bind(&record.description)
        .bind(record.amount.amount())
        .bind(record.order_id.map(|id| id.as_i64()))
        .bind(record.outcome.as_str())
        .bind(&record.message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_payment_notifications(&self) -> Result<Vec<PaymentNotificationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT received_at, transaction_id, description, amount, order_id, outcome, message
            FROM payment_notifications
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_notification).collect()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// Order transaction over a PostgreSQL connection.
///
/// Wraps a `sqlx` transaction; dropping it uncommitted rolls back.
pub struct PostgresTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }
}

#[async_trait]
impl InventoryLedger for PostgresTransaction {
    #[tracing::instrument(skip(self))]
    async fn reserve(&mut self, variant_id: VariantId, quantity: u32) -> Result<Reservation> {
        let conn = self.conn()?;

        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE product_variants
            SET stock = stock - $2
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(variant_id.as_i64())
        .bind(i64::from(quantity))
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(remaining) = remaining {
            metrics::counter!("stock_reservations_total", "result" => "reserved").increment(1);
            return Ok(Reservation {
                variant_id,
                quantity,
                remaining: stock_from_db(remaining)?,
            });
        }

        // Nothing was written; this read only classifies the failure.
        let available: Option<i64> =
            sqlx::query_scalar("SELECT stock FROM product_variants WHERE id = $1")
                .bind(variant_id.as_i64())
                .fetch_optional(&mut *conn)
                .await?;

        match available {
            Some(available) => {
                metrics::counter!("stock_reservations_total", "result" => "insufficient")
                    .increment(1);
                Err(StoreError::InsufficientStock {
                    variant_id,
                    requested: quantity,
                    available: stock_from_db(available)?,
                })
            }
            None => Err(StoreError::VariantNotFound(variant_id)),
        }
    }
}

#[async_trait]
impl OrderTransaction for PostgresTransaction {
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let conn = self.conn()?;
        let audit_log = serde_json::to_value(&order.audit_log)?;
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (user_id, customer_name, customer_phone, shipping_address,
                                total_amount, shipping_fee, status, payment_method, note,
                                audit_log, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.user_id.as_i64())
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(&order.shipping_address)
        .bind(order.total_amount.amount())
        .bind(order.shipping_fee.amount())
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(&order.note)
        .bind(audit_log)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        row_to_order(&row)
    }

    async fn insert_item(&mut self, order_id: OrderId, item: &NewOrderItem) -> Result<OrderItem> {
        let conn = self.conn()?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO order_items (order_id, product_id, variant_id, quantity, price_at_purchase)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(order_id.as_i64())
        .bind(item.product_id.as_i64())
        .bind(item.variant_id.as_i64())
        .bind(i64::from(item.quantity))
        .bind(item.price_at_purchase.amount())
        .fetch_one(&mut *conn)
        .await?;

        row_to_item(&row)
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }
}
