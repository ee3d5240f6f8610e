use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    CartId, CartItemId, Money, OrderId, OrderItemId, OrderStatus, PageRequest, ProductId,
    SortDirection, UserId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Cart, CartItem, CartOwner, NewOrder, NewProduct, NewUser, Order, OrderItem, OrderQuery,
    OrderSortField, Product, ProductQuery, ProductSortField, Result, StatusTotal, StoreError, User,
    model::USERS_EMAIL_UNIQUE,
    store::{Store, Transaction},
};

/// In-memory store implementation for tests and local runs.
///
/// Every transaction holds the whole store exclusively and works on a copy of
/// its state, which replaces the shared state on commit. Transactions are
/// therefore fully serialized.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of products stored, archived ones included.
    pub async fn product_count(&self) -> usize {
        self.state.lock().await.products.len()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[derive(Clone, Debug, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    carts: BTreeMap<CartId, Cart>,
    orders: BTreeMap<OrderId, Order>,
    users: BTreeMap<UserId, User>,
    sequences: Sequences,
}

#[derive(Clone, Copy, Debug, Default)]
struct Sequences {
    product: i64,
    cart: i64,
    cart_item: i64,
    order: i64,
    order_item: i64,
    user: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

/// Transaction over an [`InMemoryStore`].
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTransaction { guard, working })
    }
}

impl MemoryTransaction {
    fn cart_mut_for_item(&mut self, id: CartItemId) -> Option<&mut Cart> {
        self.working
            .carts
            .values_mut()
            .find(|cart| cart.items.iter().any(|item| item.id == id))
    }
}

fn compare_products(a: &Product, b: &Product, field: ProductSortField) -> Ordering {
    let primary = match field {
        ProductSortField::Id => Ordering::Equal,
        ProductSortField::Name => a.name.cmp(&b.name),
        ProductSortField::Price => a.price.cmp(&b.price),
        ProductSortField::Stock => a.stock.cmp(&b.stock),
        ProductSortField::CreatedAt => a.created_at.cmp(&b.created_at),
    };
    primary.then(a.id.cmp(&b.id))
}

fn compare_orders(a: &Order, b: &Order, field: OrderSortField) -> Ordering {
    let primary = match field {
        OrderSortField::Id => Ordering::Equal,
        OrderSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        OrderSortField::Total => a.total.cmp(&b.total),
        OrderSortField::Status => a.status.as_str().cmp(b.status.as_str()),
    };
    primary.then(a.id.cmp(&b.id))
}

fn paginate<T>(mut rows: Vec<T>, direction: SortDirection, page: PageRequest) -> (Vec<T>, u64) {
    if direction == SortDirection::Desc {
        rows.reverse();
    }
    let total = rows.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let rows = rows
        .into_iter()
        .skip(offset)
        .take(page.limit as usize)
        .collect();
    (rows, total)
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        // The whole store is already held exclusively.
        self.get_product(id).await
    }

    async fn insert_product(&mut self, product: NewProduct) -> Result<Product> {
        let id = ProductId::new(next(&mut self.working.sequences.product));
        let now = Utc::now();
        let product = Product {
            id,
            name: product.name,
            description: product.description,
            price: product.price,
            stock: product.stock,
            category: product.category,
            active: product.active,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        self.working.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(&mut self, product: &Product) -> Result<()> {
        let stored = self
            .working
            .products
            .get_mut(&product.id)
            .ok_or(StoreError::MissingRow {
                entity: "Product",
                id: product.id.get(),
            })?;
        *stored = Product {
            id: stored.id,
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..product.clone()
        };
        Ok(())
    }

    async fn list_products(&mut self, query: &ProductQuery) -> Result<(Vec<Product>, u64)> {
        let mut rows: Vec<Product> = self
            .working
            .products
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_products(a, b, query.sort));
        Ok(paginate(rows, query.direction, query.page))
    }

    async fn find_cart(&mut self, owner: &CartOwner) -> Result<Option<Cart>> {
        Ok(self
            .working
            .carts
            .values()
            .find(|cart| &cart.owner == owner)
            .cloned())
    }

    async fn get_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.working.carts.get(&id).cloned())
    }

    async fn insert_cart(&mut self, owner: &CartOwner) -> Result<Cart> {
        if self.working.carts.values().any(|cart| &cart.owner == owner) {
            return Err(StoreError::UniqueViolation {
                constraint: owner.unique_constraint().to_string(),
            });
        }
        let id = CartId::new(next(&mut self.working.sequences.cart));
        let now = Utc::now();
        let cart = Cart {
            id,
            owner: owner.clone(),
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.working.carts.insert(id, cart.clone());
        Ok(cart)
    }

    async fn delete_cart(&mut self, id: CartId) -> Result<()> {
        self.working.carts.remove(&id);
        Ok(())
    }

    async fn get_cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>> {
        Ok(self
            .working
            .carts
            .values()
            .flat_map(|cart| cart.items.iter())
            .find(|item| item.id == id)
            .cloned())
    }

    async fn insert_cart_item(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        if !self.working.products.contains_key(&product_id) {
            return Err(StoreError::MissingRow {
                entity: "Product",
                id: product_id.get(),
            });
        }
        let id = CartItemId::new(next(&mut self.working.sequences.cart_item));
        let cart = self
            .working
            .carts
            .get_mut(&cart_id)
            .ok_or(StoreError::MissingRow {
                entity: "Cart",
                id: cart_id.get(),
            })?;
        if cart.item_for_product(product_id).is_some() {
            return Err(StoreError::UniqueViolation {
                constraint: "cart_items_cart_id_product_id_key".to_string(),
            });
        }
        let now = Utc::now();
        let item = CartItem {
            id,
            cart_id,
            product_id,
            quantity,
            added_at: now,
        };
        cart.items.push(item.clone());
        cart.updated_at = now;
        Ok(item)
    }

    async fn set_cart_item_quantity(&mut self, id: CartItemId, quantity: u32) -> Result<()> {
        let cart = self.cart_mut_for_item(id).ok_or(StoreError::MissingRow {
            entity: "CartItem",
            id: id.get(),
        })?;
        if let Some(item) = cart.items.iter_mut().find(|item| item.id == id) {
            item.quantity = quantity;
        }
        cart.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<()> {
        if let Some(cart) = self.cart_mut_for_item(id) {
            cart.items.retain(|item| item.id != id);
            cart.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn clear_cart_items(&mut self, cart_id: CartId) -> Result<u64> {
        let Some(cart) = self.working.carts.get_mut(&cart_id) else {
            return Ok(0);
        };
        let removed = cart.items.len() as u64;
        cart.items.clear();
        cart.updated_at = Utc::now();
        Ok(removed)
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let id = OrderId::new(next(&mut self.working.sequences.order));
        let mut items = Vec::with_capacity(order.items().len());
        for line in order.items() {
            if !self.working.products.contains_key(&line.product_id) {
                return Err(StoreError::MissingRow {
                    entity: "Product",
                    id: line.product_id.get(),
                });
            }
            items.push(OrderItem {
                id: OrderItemId::new(next(&mut self.working.sequences.order_item)),
                order_id: id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            });
        }
        let now = Utc::now();
        let order = Order {
            id,
            user_id: order.user_id,
            status: OrderStatus::Pending,
            total: order.total(),
            notes: order.notes,
            items,
            created_at: now,
            updated_at: now,
        };
        self.working.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.get_order(id).await
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let stored = self
            .working
            .orders
            .get_mut(&order.id)
            .ok_or(StoreError::MissingRow {
                entity: "Order",
                id: order.id.get(),
            })?;
        stored.status = order.status;
        stored.notes = order.notes.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn list_orders(&mut self, query: &OrderQuery) -> Result<(Vec<Order>, u64)> {
        let mut rows: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_orders(a, b, query.sort));
        Ok(paginate(rows, query.direction, query.page))
    }

    async fn order_status_totals(&mut self, user_id: Option<UserId>) -> Result<Vec<StatusTotal>> {
        let mut totals: BTreeMap<OrderStatus, (u64, Money)> = BTreeMap::new();
        for order in self.working.orders.values() {
            if user_id.is_some_and(|id| id != order.user_id) {
                continue;
            }
            let entry = totals.entry(order.status).or_default();
            entry.0 += 1;
            entry.1 = entry.1.checked_add(order.total).ok_or_else(|| StoreError::Corrupt {
                column: "total_cents",
                reason: format!("sum of {} order totals overflows", order.status),
            })?;
        }
        Ok(totals
            .into_iter()
            .map(|(status, (count, total))| StatusTotal {
                status,
                count,
                total,
            })
            .collect())
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User> {
        if self
            .working
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::UniqueViolation {
                constraint: USERS_EMAIL_UNIQUE.to_string(),
            });
        }
        let id = UserId::new(next(&mut self.working.sequences.user));
        let user = User {
            id,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        self.working.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&mut self, id: UserId) -> Result<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn commit(self) -> Result<()> {
        let MemoryTransaction { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}
