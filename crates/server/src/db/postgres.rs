//! `PostgreSQL` implementation of the store traits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use muchio_core::{
    Email, FulfillmentStatus, InventoryType, OptionValueId, OrderId, OrderItemId, PaymentStatus,
    ProductId, StockStatus, UserId, UserRole, VariantId,
};

use super::{OrderStore, ProductStore, RepositoryError, StockAdjustment, Store, UserStore};
use crate::models::{
    Address, CustomerSpending, NewOrder, NewUser, OptionValue, Order, OrderItem,
    OrderWithCustomer, Product, ProductSales, ShippingInfo, StockScope, TrackingUpdate, User,
    Variant,
};

macro_rules! user_columns {
    () => {
        "id, email, first_name, last_name, street, city, province, postal_code, country, \
         phone, role, is_active, email_subscribed, sms_subscribed, payment_customer_id, \
         created_at, updated_at"
    };
}

macro_rules! order_columns {
    () => {
        "id, user_id, order_number, subtotal, shipping_carrier, shipping_cost, shipping_option, \
         shipping_address, total_price, payment_status, fulfillment_status, tracking_number, \
         carrier, payment_event_id, checkout_session_id, confirmation_sent_at, created_at, \
         updated_at"
    };
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    first_name: String,
    last_name: String,
    street: String,
    city: String,
    province: String,
    postal_code: String,
    country: String,
    phone: String,
    role: UserRole,
    is_active: bool,
    email_subscribed: bool,
    sms_subscribed: bool,
    payment_customer_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            email,
            first_name: row.first_name,
            last_name: row.last_name,
            street: row.street,
            city: row.city,
            province: row.province,
            postal_code: row.postal_code,
            country: row.country,
            phone: row.phone,
            role: row.role,
            is_active: row.is_active,
            email_subscribed: row.email_subscribed,
            sms_subscribed: row.sms_subscribed,
            payment_customer_id: row.payment_customer_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    sku: Option<String>,
    price: Decimal,
    cost_price: Option<Decimal>,
    current_stock: i32,
    inventory_type: InventoryType,
    payment_product_id: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: i32,
    option_name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct OptionRow {
    id: i32,
    variant_id: i32,
    value: String,
    price: Decimal,
    sku: Option<String>,
    quantity: i32,
    payment_product_id: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    order_number: i64,
    subtotal: Decimal,
    shipping_carrier: String,
    shipping_cost: Decimal,
    shipping_option: String,
    shipping_address: Option<Json<Address>>,
    total_price: Decimal,
    payment_status: PaymentStatus,
    fulfillment_status: FulfillmentStatus,
    tracking_number: Option<String>,
    carrier: Option<String>,
    payment_event_id: Option<String>,
    checkout_session_id: Option<String>,
    confirmation_sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: OrderId::new(self.id),
            user_id: UserId::new(self.user_id),
            order_number: self.order_number,
            items,
            subtotal: self.subtotal,
            shipping_info: ShippingInfo {
                carrier_name: self.shipping_carrier,
                shipping_cost: self.shipping_cost,
                address: self.shipping_address.map(|json| json.0),
                shipping_option: self.shipping_option,
            },
            total_price: self.total_price,
            payment_status: self.payment_status,
            fulfillment_status: self.fulfillment_status,
            tracking_number: self.tracking_number,
            carrier: self.carrier,
            payment_event_id: self.payment_event_id,
            checkout_session_id: self.checkout_session_id,
            confirmation_sent_at: self.confirmation_sent_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: i32,
    variant_id: Option<i32>,
    name: String,
    variant_name: Option<String>,
    quantity: i32,
    price: Decimal,
    total: Decimal,
    stock_status: StockStatus,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            product_id: ProductId::new(row.product_id),
            variant_id: row.variant_id.map(OptionValueId::new),
            name: row.name,
            variant_name: row.variant_name,
            quantity: row.quantity,
            price: row.price,
            total: row.total,
            stock_status: row.stock_status,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductSalesRow {
    name: String,
    total_sold: i64,
    total_revenue: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct SpendingRow {
    #[sqlx(flatten)]
    user: UserRow,
    total_spending: Decimal,
}

/// Map a unique violation to `RepositoryError::Conflict`.
fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

// =============================================================================
// Store
// =============================================================================

/// Store backed by the `shop` schema.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Load the items of the given orders, grouped by order id.
    async fn load_items(
        &self,
        order_ids: &[i32],
    ) -> Result<HashMap<i32, Vec<OrderItem>>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, variant_id, name, variant_name,
                   quantity, price, total, stock_status
            FROM shop.order_item
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i32, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            grouped.entry(row.order_id).or_default().push(row.into());
        }
        Ok(grouped)
    }

    /// Attach items to order rows, keeping the row order.
    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
        let mut items = self.load_items(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect())
    }

    async fn hydrate_one(&self, row: Option<OrderRow>) -> Result<Option<Order>, RepositoryError> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM shop.app_user WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM shop.app_user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "INSERT INTO shop.app_user \
             (email, first_name, last_name, street, city, province, postal_code, country, phone) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING ",
            user_columns!()
        ))
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.street)
        .bind(&user.city)
        .bind(&user.province)
        .bind(&user.postal_code)
        .bind(&user.country)
        .bind(&user.phone)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;

        row.try_into()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn update_user(&self, user: &User) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "UPDATE shop.app_user SET \
             first_name = $2, last_name = $3, street = $4, city = $5, province = $6, \
             postal_code = $7, country = $8, phone = $9, payment_customer_id = $10, \
             updated_at = NOW() \
             WHERE id = $1 RETURNING ",
            user_columns!()
        ))
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.street)
        .bind(&user.city)
        .bind(&user.province)
        .bind(&user.postal_code)
        .bind(&user.country)
        .bind(&user.phone)
        .bind(&user.payment_customer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let Some(row) = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, sku, price, cost_price, current_stock, inventory_type,
                   payment_product_id
            FROM shop.product
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let variant_rows = sqlx::query_as::<_, VariantRow>(
            r"
            SELECT id, option_name
            FROM shop.product_variant
            WHERE product_id = $1
            ORDER BY position, id
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let option_rows = sqlx::query_as::<_, OptionRow>(
            r"
            SELECT o.id, o.variant_id, o.value, o.price, o.sku, o.quantity, o.payment_product_id
            FROM shop.variant_option o
            JOIN shop.product_variant v ON v.id = o.variant_id
            WHERE v.product_id = $1
            ORDER BY o.position, o.id
            ",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut options: HashMap<i32, Vec<OptionValue>> = HashMap::new();
        for option in option_rows {
            options.entry(option.variant_id).or_default().push(OptionValue {
                id: OptionValueId::new(option.id),
                value: option.value,
                price: option.price,
                sku: option.sku,
                quantity: option.quantity,
                payment_product_id: option.payment_product_id,
            });
        }

        let variants = variant_rows
            .into_iter()
            .map(|variant| Variant {
                id: VariantId::new(variant.id),
                option_name: variant.option_name,
                option_values: options.remove(&variant.id).unwrap_or_default(),
            })
            .collect();

        Ok(Some(Product {
            id: ProductId::new(row.id),
            name: row.name,
            sku: row.sku,
            price: row.price,
            cost_price: row.cost_price,
            current_stock: row.current_stock,
            inventory_type: row.inventory_type,
            payment_product_id: row.payment_product_id,
            variants,
        }))
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, product_id = %item.product_id))]
    async fn apply_stock_adjustment(
        &self,
        item: &OrderItem,
    ) -> Result<StockAdjustment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<StockStatus> = sqlx::query_scalar(
            "SELECT stock_status FROM shop.order_item WHERE id = $1 FOR UPDATE",
        )
        .bind(item.id)
        .fetch_optional(&mut *tx)
        .await?;

        let status = current.ok_or(RepositoryError::NotFound)?;
        if status.is_settled() {
            tx.commit().await?;
            return Ok(StockAdjustment::AlreadySettled(status));
        }

        let adjustment = adjust_stock(&mut tx, item).await?;

        sqlx::query("UPDATE shop.order_item SET stock_status = $2 WHERE id = $1")
            .bind(item.id)
            .bind(adjustment.status())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(adjustment)
    }
}

/// Check and decrement the stock an item draws from, inside `tx`.
async fn adjust_stock(
    tx: &mut Transaction<'_, Postgres>,
    item: &OrderItem,
) -> Result<StockAdjustment, RepositoryError> {
    let product: Option<(InventoryType, i32)> = sqlx::query_as(
        "SELECT inventory_type, current_stock FROM shop.product WHERE id = $1 FOR UPDATE",
    )
    .bind(item.product_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some((inventory_type, current_stock)) = product else {
        return Ok(StockAdjustment::ProductNotFound);
    };
    if inventory_type == InventoryType::DoNotTrack {
        return Ok(StockAdjustment::Untracked);
    }

    if let Some(option_id) = item.variant_id {
        let quantity: Option<i32> = sqlx::query_scalar(
            r"
            SELECT o.quantity
            FROM shop.variant_option o
            JOIN shop.product_variant v ON v.id = o.variant_id
            WHERE o.id = $1 AND v.product_id = $2
            FOR UPDATE OF o
            ",
        )
        .bind(option_id)
        .bind(item.product_id)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(available) = quantity else {
            return Ok(StockAdjustment::OptionNotFound);
        };
        if available < item.quantity {
            return Ok(StockAdjustment::Insufficient {
                scope: StockScope::Variant,
                available,
            });
        }

        let remaining: i32 = sqlx::query_scalar(
            "UPDATE shop.variant_option SET quantity = quantity - $2 WHERE id = $1 RETURNING quantity",
        )
        .bind(option_id)
        .bind(item.quantity)
        .fetch_one(&mut **tx)
        .await?;

        return Ok(StockAdjustment::Applied {
            scope: StockScope::Variant,
            remaining,
        });
    }

    if current_stock < item.quantity {
        return Ok(StockAdjustment::Insufficient {
            scope: StockScope::Product,
            available: current_stock,
        });
    }

    let remaining: i32 = sqlx::query_scalar(
        r"
        UPDATE shop.product
        SET current_stock = current_stock - $2, updated_at = NOW()
        WHERE id = $1
        RETURNING current_stock
        ",
    )
    .bind(item.product_id)
    .bind(item.quantity)
    .fetch_one(&mut **tx)
    .await?;

    Ok(StockAdjustment::Applied {
        scope: StockScope::Product,
        remaining,
    })
}

#[async_trait]
impl OrderStore for PgStore {
    async fn next_sequence_value(&self, name: &str) -> Result<i64, RepositoryError> {
        let seq: i64 = sqlx::query_scalar(
            r"
            INSERT INTO shop.sequence_counter (name, seq)
            VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET seq = shop.sequence_counter.seq + 1
            RETURNING seq
            ",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(seq)
    }

    #[instrument(skip(self, order))]
    async fn insert_order(
        &self,
        order: &NewOrder,
        order_number: i64,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "INSERT INTO shop.customer_order \
             (user_id, order_number, subtotal, shipping_carrier, shipping_cost, shipping_option, \
              shipping_address, total_price, payment_status, payment_event_id, checkout_session_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING ",
            order_columns!()
        ))
        .bind(order.user_id)
        .bind(order_number)
        .bind(order.subtotal)
        .bind(&order.shipping_info.carrier_name)
        .bind(order.shipping_info.shipping_cost)
        .bind(&order.shipping_info.shipping_option)
        .bind(order.shipping_info.address.as_ref().map(Json))
        .bind(order.total_price)
        .bind(order.payment_status)
        .bind(&order.payment_event_id)
        .bind(&order.checkout_session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "order for this payment event"))?;

        let mut items = Vec::with_capacity(order.items.len());
        for (position, item) in order.items.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| RepositoryError::DataCorruption("too many order items".to_owned()))?;
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                RepositoryError::DataCorruption(format!("quantity out of range: {}", item.quantity))
            })?;

            let item_row = sqlx::query_as::<_, OrderItemRow>(
                r"
                INSERT INTO shop.order_item
                    (order_id, position, product_id, variant_id, name, variant_name,
                     quantity, price, total, stock_status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING id, order_id, product_id, variant_id, name, variant_name,
                          quantity, price, total, stock_status
                ",
            )
            .bind(row.id)
            .bind(position)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(&item.name)
            .bind(&item.variant_name)
            .bind(quantity)
            .bind(item.price)
            .bind(item.total)
            .bind(order.item_stock_status)
            .fetch_one(&mut *tx)
            .await?;

            items.push(item_row.into());
        }

        tx.commit().await?;
        Ok(row.into_order(items))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM shop.customer_order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_one(row).await
    }

    async fn find_order_by_payment_event(
        &self,
        event_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM shop.customer_order WHERE payment_event_id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_one(row).await
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM shop.customer_order WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn count_orders(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.customer_order")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self, update), fields(order_id = %id))]
    async fn update_tracking(
        &self,
        id: OrderId,
        update: &TrackingUpdate,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "UPDATE shop.customer_order \
             SET tracking_number = $2, carrier = $3, fulfillment_status = 'fulfilled', \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING ",
            order_columns!()
        ))
        .bind(id)
        .bind(&update.tracking_number)
        .bind(&update.carrier)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_one(row).await
    }

    async fn orders_with_pending_stock(&self, limit: i64) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM shop.customer_order o \
             WHERE EXISTS ( \
                 SELECT 1 FROM shop.order_item i \
                 WHERE i.order_id = o.id AND i.stock_status = 'pending' \
             ) \
             ORDER BY o.id \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn claim_confirmation(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.customer_order
            SET confirmation_sent_at = NOW()
            WHERE id = $1 AND confirmation_sent_at IS NULL
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_confirmation(&self, id: OrderId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE shop.customer_order SET confirmation_sent_at = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn orders_awaiting_confirmation(
        &self,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM shop.customer_order \
             WHERE confirmation_sent_at IS NULL AND payment_event_id IS NOT NULL \
             ORDER BY id \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list_orders_with_customers(&self) -> Result<Vec<OrderWithCustomer>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM shop.customer_order ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        let orders = self.hydrate(rows).await?;

        let mut user_ids: Vec<i32> = orders.iter().map(|o| o.user_id.as_i32()).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let user_rows = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM shop.app_user WHERE id = ANY($1)"
        ))
        .bind(&user_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut users: HashMap<UserId, User> = HashMap::with_capacity(user_rows.len());
        for row in user_rows {
            let user = User::try_from(row)?;
            users.insert(user.id, user);
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderWithCustomer {
                user: users.get(&order.user_id).cloned(),
                order,
            })
            .collect())
    }

    #[instrument(skip(self), fields(order_id = %id))]
    async fn delete_order(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.customer_order WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn product_sales(&self) -> Result<Vec<ProductSales>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductSalesRow>(
            r"
            SELECT name,
                   SUM(quantity)::BIGINT AS total_sold,
                   SUM(quantity * price) AS total_revenue
            FROM shop.order_item
            GROUP BY name
            ORDER BY total_sold DESC, name
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ProductSales {
                name: row.name,
                total_sold: row.total_sold,
                total_revenue: row.total_revenue,
            })
            .collect())
    }

    async fn customer_spending(&self) -> Result<Vec<CustomerSpending>, RepositoryError> {
        let rows = sqlx::query_as::<_, SpendingRow>(concat!(
            "SELECT ",
            user_columns!(),
            ", s.total_spending \
             FROM shop.app_user u \
             JOIN ( \
                 SELECT user_id, SUM(total_price) AS total_spending \
                 FROM shop.customer_order \
                 GROUP BY user_id \
             ) s ON s.user_id = u.id \
             ORDER BY s.total_spending DESC, u.id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let user = User::try_from(row.user)?;
                Ok(CustomerSpending {
                    user_id: user.id,
                    name: user.display_name(),
                    email: user.email,
                    total_spending: row.total_spending,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
