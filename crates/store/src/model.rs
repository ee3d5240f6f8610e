//! Records persisted by the store.

use chrono::{DateTime, Utc};
use common::{
    CartId, CartItemId, Money, OrderId, OrderItemId, OrderStatus, ProductId, Role, SessionId,
    UserId,
};
use serde::Serialize;

/// Name of the unique constraint on user emails.
pub const USERS_EMAIL_UNIQUE: &str = "users_email_key";

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub stock: u32,
    pub category: String,
    pub active: bool,
    /// Set when the product was deleted from the catalog. Archived rows stay
    /// around so historical order items keep their reference.
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns true if the product was removed from the catalog.
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Fields of a product about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub stock: u32,
    pub category: String,
    pub active: bool,
}

/// Owner of a cart: an authenticated user or an anonymous session, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    User(UserId),
    Session(SessionId),
}

impl CartOwner {
    /// Name of the unique constraint allowing one cart per owner of this kind.
    pub fn unique_constraint(&self) -> &'static str {
        match self {
            CartOwner::User(_) => "carts_user_id_key",
            CartOwner::Session(_) => "carts_session_id_key",
        }
    }
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartOwner::User(id) => write!(f, "user:{id}"),
            CartOwner::Session(id) => write!(f, "session:{id}"),
        }
    }
}

/// A shopping cart with its lines, oldest line first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwner,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Returns the line holding `product_id`, if any.
    pub fn item_for_product(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    /// Returns the line with the given id, if it belongs to this cart.
    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One product line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    /// Sum of the item subtotals, fixed when the order was created.
    pub total: Money,
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Recomputes the sum of item subtotals. `None` on overflow.
    pub fn items_total(&self) -> Option<Money> {
        self.items
            .iter()
            .map(OrderItem::subtotal)
            .try_fold(Money::zero(), |acc, line| acc.checked_add(line?))
    }
}

/// One product line in an order, priced at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price captured when the order was created.
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the line subtotal (quantity * unit_price), `None` on overflow.
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// An order about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub notes: Option<String>,
    items: Vec<NewOrderItem>,
    total: Money,
}

impl NewOrder {
    /// Creates a pending order; the total is the sum of the line subtotals.
    ///
    /// Returns `None` when a subtotal or the total does not fit in [`Money`].
    pub fn new(user_id: UserId, notes: Option<String>, items: Vec<NewOrderItem>) -> Option<Self> {
        let total = items.iter().try_fold(Money::zero(), |acc, item| {
            acc.checked_add(item.unit_price.checked_multiply(item.quantity)?)
        })?;
        Some(Self {
            user_id,
            notes,
            items,
            total,
        })
    }

    pub fn items(&self) -> &[NewOrderItem] {
        &self.items
    }

    pub fn total(&self) -> Money {
        self.total
    }
}

/// A line of an order about to be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// An account about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
}

/// Number of orders and their summed totals for one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTotal {
    pub status: OrderStatus,
    pub count: u64,
    pub total: Money,
}
