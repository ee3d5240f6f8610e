use async_trait::async_trait;
use common::{CartId, CartItemId, OrderId, ProductId, UserId};

use crate::{
    Cart, CartItem, CartOwner, NewOrder, NewProduct, NewUser, Order, OrderQuery, Product,
    ProductQuery, Result, StatusTotal, User,
};

/// Core trait for store implementations.
///
/// A store hands out [`Transaction`]s; all reads and writes go through one.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// The unit of work handed out by this store.
    type Tx: Transaction + 'static;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A unit of work against the store.
///
/// Writes become visible to other transactions only after [`commit`].
/// Dropping a transaction without committing discards every write made
/// through it.
///
/// The `lock_*` methods read a row and hold it until the transaction ends,
/// so a read-check-write sequence on that row behaves as if serialized.
///
/// [`commit`]: Transaction::commit
#[async_trait]
pub trait Transaction: Send {
    /// Fetches a product, archived or not.
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Fetches a product and locks its row for the rest of the transaction.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    async fn insert_product(&mut self, product: NewProduct) -> Result<Product>;

    /// Persists every mutable field of `product`.
    async fn update_product(&mut self, product: &Product) -> Result<()>;

    /// Returns the requested page of matching products and the total match count.
    async fn list_products(&mut self, query: &ProductQuery) -> Result<(Vec<Product>, u64)>;

    /// Fetches the cart of `owner` with its lines and locks it.
    async fn find_cart(&mut self, owner: &CartOwner) -> Result<Option<Cart>>;

    /// Fetches a cart by id with its lines.
    async fn get_cart(&mut self, id: CartId) -> Result<Option<Cart>>;

    /// Creates an empty cart for `owner`.
    ///
    /// Fails with [`StoreError::UniqueViolation`] when `owner` already has a
    /// cart. The transaction stays usable after that failure.
    ///
    /// [`StoreError::UniqueViolation`]: crate::StoreError::UniqueViolation
    async fn insert_cart(&mut self, owner: &CartOwner) -> Result<Cart>;

    /// Deletes a cart and all of its lines.
    async fn delete_cart(&mut self, id: CartId) -> Result<()>;

    async fn get_cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>>;

    async fn insert_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem>;

    async fn set_cart_item_quantity(&mut self, id: CartItemId, quantity: u32) -> Result<()>;

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<()>;

    /// Deletes every line of a cart, returning how many were removed.
    async fn clear_cart_items(&mut self, cart_id: CartId) -> Result<u64>;

    /// Inserts a pending order with its lines.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Fetches an order and locks its row for the rest of the transaction.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Persists the status and notes of `order`. Lines and total are immutable.
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    /// Returns the requested page of matching orders and the total match count.
    async fn list_orders(&mut self, query: &OrderQuery) -> Result<(Vec<Order>, u64)>;

    /// Per-status order counts and totals, optionally for one user.
    async fn order_status_totals(&mut self, user_id: Option<UserId>) -> Result<Vec<StatusTotal>>;

    /// Inserts an account; fails with a unique violation on a taken email.
    async fn insert_user(&mut self, user: NewUser) -> Result<User>;

    async fn get_user(&mut self, id: UserId) -> Result<Option<User>>;

    /// Looks an account up by email, ignoring case.
    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>>;

    /// Makes every write of this transaction visible.
    async fn commit(self) -> Result<()>;
}
