use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    CartId, CartItemId, Money, OrderId, OrderItemId, OrderStatus, ProductId, Role, SessionId,
    UserId,
};
use sqlx::{
    PgPool, Postgres, QueryBuilder, Row,
    postgres::{PgPoolOptions, PgRow},
};

use crate::{
    Cart, CartItem, CartOwner, NewOrder, NewProduct, NewUser, Order, OrderItem, OrderQuery,
    Product, ProductQuery, Result, StatusTotal, StoreError, User,
    store::{Store, Transaction},
};

const PRODUCT_COLUMNS: &str =
    "id, name, description, price_cents, stock, category, active, archived_at, created_at, updated_at";
const CART_COLUMNS: &str = "id, user_id, session_id, created_at, updated_at";
const CART_ITEM_COLUMNS: &str = "id, cart_id, product_id, quantity, added_at";
const ORDER_COLUMNS: &str = "id, user_id, status, total_cents, notes, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, unit_price_cents";
const USER_COLUMNS: &str = "id, email, name, password_hash, role, created_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool to `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
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
}

/// Transaction over a [`PostgresStore`]. Rolled back when dropped uncommitted.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

fn corrupt(column: &'static str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        column,
        reason: reason.to_string(),
    }
}

fn to_u32(column: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|e| corrupt(column, e))
}

fn quantity_param(quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|e| corrupt("quantity", e))
}

/// Maps unique violations to [`StoreError::UniqueViolation`].
fn map_unique(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::UniqueViolation {
            constraint: db_err.constraint().unwrap_or_default().to_string(),
        };
    }
    StoreError::Database(e)
}

/// Escapes `%`, `_` and `\` for use inside an `ILIKE` pattern.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: to_u32("stock", row.try_get("stock")?)?,
        category: row.try_get("category")?,
        active: row.try_get("active")?,
        archived_at: row.try_get("archived_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        id: CartItemId::new(row.try_get("id")?),
        cart_id: CartId::new(row.try_get("cart_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: to_u32("quantity", i64::from(row.try_get::<i32, _>("quantity")?))?,
        added_at: row.try_get("added_at")?,
    })
}

fn row_to_cart(row: &PgRow, items: Vec<CartItem>) -> Result<Cart> {
    let user_id: Option<i64> = row.try_get("user_id")?;
    let session_id: Option<String> = row.try_get("session_id")?;
    let owner = match (user_id, session_id) {
        (Some(id), None) => CartOwner::User(UserId::new(id)),
        (None, Some(session)) => CartOwner::Session(
            SessionId::new(session).ok_or_else(|| corrupt("session_id", "blank session id"))?,
        ),
        _ => return Err(corrupt("user_id", "cart must have exactly one owner")),
    };
    Ok(Cart {
        id: CartId::new(row.try_get("id")?),
        owner,
        items,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: to_u32("quantity", i64::from(row.try_get::<i32, _>("quantity")?))?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        status: status.parse().map_err(|e| corrupt("status", e))?,
        total: Money::from_cents(row.try_get("total_cents")?),
        notes: row.try_get("notes")?,
        items,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_user(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse::<Role>().map_err(|e| corrupt("role", e))?,
        created_at: row.try_get("created_at")?,
    })
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    qb.push(" WHERE archived_at IS NULL");
    if let Some(ref category) = query.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(ref search) = query.search {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(active) = query.active {
        qb.push(" AND active = ").push_bind(active);
    }
    if let Some(min) = query.min_price {
        qb.push(" AND price_cents >= ").push_bind(min.cents());
    }
    if let Some(max) = query.max_price {
        qb.push(" AND price_cents <= ").push_bind(max.cents());
    }
}

fn push_order_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &OrderQuery) {
    qb.push(" WHERE 1=1");
    if let Some(user_id) = query.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.get());
    }
    if let Some(status) = query.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = query.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = query.created_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
    if let Some(min) = query.min_total {
        qb.push(" AND total_cents >= ").push_bind(min.cents());
    }
    if let Some(max) = query.max_total {
        qb.push(" AND total_cents <= ").push_bind(max.cents());
    }
}

impl PostgresTransaction {
    async fn cart_items(&mut self, cart_id: i64) -> Result<Vec<CartItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY added_at, id"
        ))
        .bind(cart_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_cart_item).collect()
    }

    async fn load_cart(&mut self, row: Option<PgRow>) -> Result<Option<Cart>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let items = self.cart_items(row.try_get("id")?).await?;
        row_to_cart(&row, items).map(Some)
    }

    /// Loads the lines of every order in `rows` and assembles the orders.
    async fn load_orders(&mut self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let item_rows = sqlx::query(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let item = row_to_order_item(row)?;
            items.entry(item.order_id).or_default().push(item);
        }

        rows.iter()
            .map(|row| {
                let id = OrderId::new(row.try_get("id")?);
                row_to_order(row, items.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn fetch_order(&mut self, id: OrderId, lock: bool) -> Result<Option<Order>> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{suffix}"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        match row {
            Some(row) => Ok(self.load_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn insert_product(&mut self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, description, price_cents, stock, category, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .bind(&product.category)
        .bind(product.active)
        .fetch_one(&mut *self.tx)
        .await?;
        row_to_product(&row)
    }

    async fn update_product(&mut self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, price_cents = $4, stock = $5,
                category = $6, active = $7, archived_at = $8, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(product.id.get())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .bind(&product.category)
        .bind(product.active)
        .bind(product.archived_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow {
                entity: "Product",
                id: product.id.get(),
            });
        }
        Ok(())
    }

    async fn list_products(&mut self, query: &ProductQuery) -> Result<(Vec<Product>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *self.tx).await?;

        let direction = query.direction.as_sql();
        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_product_filters(&mut select, query);
        select.push(format_args!(
            " ORDER BY {} {direction}, id {direction}",
            query.sort.as_column()
        ));
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.page.offset()).unwrap_or(i64::MAX));
        let rows = select.build().fetch_all(&mut *self.tx).await?;

        let products = rows.iter().map(row_to_product).collect::<Result<Vec<_>>>()?;
        Ok((products, u64::try_from(total).unwrap_or_default()))
    }

    async fn find_cart(&mut self, owner: &CartOwner) -> Result<Option<Cart>> {
        let row = match owner {
            CartOwner::User(user_id) => {
                sqlx::query(&format!(
                    "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 FOR UPDATE"
                ))
                .bind(user_id.get())
                .fetch_optional(&mut *self.tx)
                .await?
            }
            CartOwner::Session(session_id) => {
                sqlx::query(&format!(
                    "SELECT {CART_COLUMNS} FROM carts WHERE session_id = $1 FOR UPDATE"
                ))
                .bind(session_id.as_str())
                .fetch_optional(&mut *self.tx)
                .await?
            }
        };
        self.load_cart(row).await
    }

    async fn get_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        self.load_cart(row).await
    }

    async fn insert_cart(&mut self, owner: &CartOwner) -> Result<Cart> {
        let (user_id, session_id) = match owner {
            CartOwner::User(id) => (Some(id.get()), None),
            CartOwner::Session(id) => (None, Some(id.as_str())),
        };
        // ON CONFLICT keeps the transaction usable, so the caller can re-read
        // the cart a concurrent request created.
        let row = sqlx::query(&format!(
            "INSERT INTO carts (user_id, session_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING RETURNING {CART_COLUMNS}"
        ))
        .bind(user_id)
        .bind(session_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        match row {
            Some(row) => row_to_cart(&row, Vec::new()),
            None => Err(StoreError::UniqueViolation {
                constraint: owner.unique_constraint().to_string(),
            }),
        }
    }

    async fn delete_cart(&mut self, id: CartId) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>> {
        let row = sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_cart_item).transpose()
    }

    async fn insert_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO cart_items (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            RETURNING {CART_ITEM_COLUMNS}
            "#
        ))
        .bind(cart_id.get())
        .bind(product_id.get())
        .bind(quantity_param(quantity)?)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_unique)?;

        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id.get())
            .execute(&mut *self.tx)
            .await?;

        row_to_cart_item(&row)
    }

    async fn set_cart_item_quantity(&mut self, id: CartItemId, quantity: u32) -> Result<()> {
        let result = sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
            .bind(id.get())
            .bind(quantity_param(quantity)?)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow {
                entity: "CartItem",
                id: id.get(),
            });
        }
        sqlx::query(
            "UPDATE carts SET updated_at = NOW() WHERE id = (SELECT cart_id FROM cart_items WHERE id = $1)",
        )
        .bind(id.get())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn clear_cart_items(&mut self, cart_id: CartId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.get())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (user_id, status, total_cents, notes)
            VALUES ($1, $2, $3, $4)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.user_id.get())
        .bind(OrderStatus::Pending.as_str())
        .bind(order.total().cents())
        .bind(&order.notes)
        .fetch_one(&mut *self.tx)
        .await?;
        let order_id: i64 = row.try_get("id")?;

        let mut items = Vec::with_capacity(order.items().len());
        for line in order.items() {
            let item_row = sqlx::query(&format!(
                r#"
                INSERT INTO order_items (order_id, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4)
                RETURNING {ORDER_ITEM_COLUMNS}
                "#
            ))
            .bind(order_id)
            .bind(line.product_id.get())
            .bind(quantity_param(line.quantity)?)
            .bind(line.unit_price.cents())
            .fetch_one(&mut *self.tx)
            .await?;
            items.push(row_to_order_item(&item_row)?);
        }

        row_to_order(&row, items)
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.fetch_order(id, false).await
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.fetch_order(id, true).await
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, notes = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(order.id.get())
        .bind(order.status.as_str())
        .bind(&order.notes)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow {
                entity: "Order",
                id: order.id.get(),
            });
        }
        Ok(())
    }

    async fn list_orders(&mut self, query: &OrderQuery) -> Result<(Vec<Order>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_order_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *self.tx).await?;

        let direction = query.direction.as_sql();
        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_order_filters(&mut select, query);
        select.push(format_args!(
            " ORDER BY {} {direction}, id {direction}",
            query.sort.as_column()
        ));
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.page.offset()).unwrap_or(i64::MAX));
        let rows = select.build().fetch_all(&mut *self.tx).await?;

        let orders = self.load_orders(rows).await?;
        Ok((orders, u64::try_from(total).unwrap_or_default()))
    }

    async fn order_status_totals(&mut self, user_id: Option<UserId>) -> Result<Vec<StatusTotal>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count, COALESCE(SUM(total_cents), 0)::BIGINT AS total
            FROM orders
            WHERE $1::BIGINT IS NULL OR user_id = $1
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(user_id.map(UserId::get))
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                Ok(StatusTotal {
                    status: status.parse().map_err(|e| corrupt("status", e))?,
                    count: u64::try_from(row.try_get::<i64, _>("count")?)
                        .map_err(|e| corrupt("count", e))?,
                    total: Money::from_cents(row.try_get("total")?),
                })
            })
            .collect()
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (email, name, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_unique)?;
        row_to_user(&row)
    }

    async fn get_user(&mut self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
