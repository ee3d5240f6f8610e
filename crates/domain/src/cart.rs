//! Shopping carts for guests and signed-in users.

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, Money, ProductId};
use serde::Serialize;
use store::{Cart, CartItem, CartOwner, Product, Store, Transaction};

use crate::context::Caller;
use crate::error::{DomainError, Result};
use crate::inventory::{self, AvailabilityIssue};

/// A cart line together with the live product it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: Product,
    /// Live unit price times quantity.
    pub subtotal: Money,
}

/// Derived totals of a cart, priced at live product prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub total_quantity: u64,
    pub distinct_items: usize,
    pub total: Money,
    pub is_empty: bool,
}

impl CartSummary {
    pub fn empty() -> Self {
        Self {
            total_quantity: 0,
            distinct_items: 0,
            total: Money::zero(),
            is_empty: true,
        }
    }

    fn from_lines(lines: &[CartLine]) -> Result<Self> {
        let total = Money::checked_sum(lines.iter().map(|l| l.subtotal))
            .ok_or_else(|| DomainError::amount_too_large("cart total"))?;
        Ok(Self {
            total_quantity: lines.iter().map(|l| u64::from(l.item.quantity)).sum(),
            distinct_items: lines.len(),
            total,
            is_empty: lines.is_empty(),
        })
    }
}

/// A cart with its lines and summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartDetails {
    pub id: CartId,
    pub owner: CartOwner,
    pub items: Vec<CartLine>,
    pub summary: CartSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of validating a cart against live inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartValidation {
    pub is_valid: bool,
    pub issues: Vec<String>,
}

/// Loads the products of every line and assembles the cart view.
async fn details<T: Transaction>(tx: &mut T, cart: Cart) -> Result<CartDetails> {
    let mut items = Vec::with_capacity(cart.items.len());
    for item in cart.items {
        let product = tx
            .get_product(item.product_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Product", item.product_id))?;
        let subtotal = product
            .price
            .checked_multiply(item.quantity)
            .ok_or_else(|| DomainError::amount_too_large("cart line subtotal"))?;
        items.push(CartLine {
            item,
            product,
            subtotal,
        });
    }
    Ok(CartDetails {
        id: cart.id,
        owner: cart.owner,
        summary: CartSummary::from_lines(&items)?,
        items,
        created_at: cart.created_at,
        updated_at: cart.updated_at,
    })
}

async fn find_or_create<T: Transaction>(tx: &mut T, owner: &CartOwner) -> Result<Cart> {
    if let Some(cart) = tx.find_cart(owner).await? {
        return Ok(cart);
    }
    match tx.insert_cart(owner).await {
        Ok(cart) => Ok(cart),
        // A concurrent first request created it in the meantime.
        Err(e) if e.is_unique_violation(owner.unique_constraint()) => tx
            .find_cart(owner)
            .await?
            .ok_or_else(|| DomainError::Internal(format!("cart of {owner} vanished"))),
        Err(e) => Err(e.into()),
    }
}

async fn reload<T: Transaction>(tx: &mut T, id: CartId) -> Result<Cart> {
    tx.get_cart(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Cart", id))
}

/// Checks every line of `cart` against live inventory.
pub(crate) async fn cart_issues<T: Transaction>(
    tx: &mut T,
    cart: &Cart,
) -> Result<Vec<AvailabilityIssue>> {
    let mut issues = Vec::new();
    for item in &cart.items {
        if let Some(issue) =
            inventory::check_availability(tx, item.product_id, u64::from(item.quantity)).await?
        {
            issues.push(issue);
        }
    }
    Ok(issues)
}

fn require_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(DomainError::InvalidArgument(
            "quantity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Service for shopping carts.
///
/// The cart of a caller is keyed by its user id when authenticated and by
/// its session id otherwise. Carts are created on first use.
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, caller: &Caller) -> Result<CartDetails> {
        let owner = caller.cart_owner()?;
        let mut tx = self.store.begin().await?;
        let cart = find_or_create(&mut tx, &owner).await?;
        let details = details(&mut tx, cart).await?;
        tx.commit().await?;
        Ok(details)
    }

    /// Adds `quantity` of a product. An existing line for the product is
    /// incremented and the new total re-validated against stock.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        caller: &Caller,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartDetails> {
        require_quantity(quantity)?;
        let owner = caller.cart_owner()?;

        let mut tx = self.store.begin().await?;
        let cart = find_or_create(&mut tx, &owner).await?;
        let existing = cart.item_for_product(product_id).cloned();
        let wanted = existing
            .as_ref()
            .map_or(0, |item| u64::from(item.quantity))
            + u64::from(quantity);

        if let Some(issue) = inventory::check_availability(&mut tx, product_id, wanted).await? {
            return Err(issue.into());
        }
        match existing {
            Some(item) => {
                let total = u32::try_from(wanted).map_err(|_| {
                    DomainError::InvalidArgument("quantity is too large".to_string())
                })?;
                tx.set_cart_item_quantity(item.id, total).await?;
            }
            None => {
                tx.insert_cart_item(cart.id, product_id, quantity).await?;
            }
        }

        let cart = reload(&mut tx, cart.id).await?;
        let details = details(&mut tx, cart).await?;
        tx.commit().await?;
        Ok(details)
    }

    /// Sets the quantity of a line. Zero is rejected; use
    /// [`remove_item`](Self::remove_item) instead.
    #[tracing::instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        caller: &Caller,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartDetails> {
        require_quantity(quantity)?;
        let owner = caller.cart_owner()?;

        let mut tx = self.store.begin().await?;
        let item = tx
            .get_cart_item(item_id)
            .await?
            .ok_or_else(|| DomainError::not_found("CartItem", item_id))?;
        let cart = reload(&mut tx, item.cart_id).await?;
        if cart.owner != owner {
            return Err(DomainError::Forbidden(
                "cart item belongs to another cart".to_string(),
            ));
        }
        if let Some(issue) =
            inventory::check_availability(&mut tx, item.product_id, u64::from(quantity)).await?
        {
            return Err(issue.into());
        }
        tx.set_cart_item_quantity(item_id, quantity).await?;

        let cart = reload(&mut tx, cart.id).await?;
        let details = details(&mut tx, cart).await?;
        tx.commit().await?;
        Ok(details)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, caller: &Caller, item_id: CartItemId) -> Result<CartDetails> {
        let owner = caller.cart_owner()?;

        let mut tx = self.store.begin().await?;
        let cart = tx
            .find_cart(&owner)
            .await?
            .filter(|cart| cart.item(item_id).is_some())
            .ok_or_else(|| DomainError::not_found("CartItem", item_id))?;
        tx.delete_cart_item(item_id).await?;

        let cart = reload(&mut tx, cart.id).await?;
        let details = details(&mut tx, cart).await?;
        tx.commit().await?;
        Ok(details)
    }

    /// Removes every line of the caller's cart. Succeeds without a cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, caller: &Caller) -> Result<()> {
        let owner = caller.cart_owner()?;
        let mut tx = self.store.begin().await?;
        if let Some(cart) = tx.find_cart(&owner).await? {
            tx.clear_cart_items(cart.id).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn summary(&self, caller: &Caller) -> Result<CartSummary> {
        let owner = caller.cart_owner()?;
        let mut tx = self.store.begin().await?;
        match tx.find_cart(&owner).await? {
            Some(cart) => Ok(details(&mut tx, cart).await?.summary),
            None => Ok(CartSummary::empty()),
        }
    }

    /// Reports every line that cannot currently be bought as requested.
    #[tracing::instrument(skip(self))]
    pub async fn validate(&self, caller: &Caller) -> Result<CartValidation> {
        let owner = caller.cart_owner()?;
        let mut tx = self.store.begin().await?;
        let issues = match tx.find_cart(&owner).await? {
            Some(cart) => cart_issues(&mut tx, &cart).await?,
            None => Vec::new(),
        };
        Ok(CartValidation {
            is_valid: issues.is_empty(),
            issues: issues.iter().map(ToString::to_string).collect(),
        })
    }

    /// Moves the caller's guest cart into their user cart and deletes it.
    ///
    /// A product present in both keeps the larger of the two quantities.
    /// Merged quantities are not checked against stock; checkout does that.
    #[tracing::instrument(skip(self))]
    pub async fn merge(&self, caller: &Caller) -> Result<CartDetails> {
        let principal = caller.require_user()?;
        let session_id = caller.session_id.clone().ok_or_else(|| {
            DomainError::InvalidArgument("a session id is required to merge carts".to_string())
        })?;

        let mut tx = self.store.begin().await?;
        let user_owner = CartOwner::User(principal.user_id);
        let user_cart = find_or_create(&mut tx, &user_owner).await?;

        let mut merged = 0usize;
        if let Some(guest) = tx.find_cart(&CartOwner::Session(session_id)).await? {
            for line in &guest.items {
                match user_cart.item_for_product(line.product_id) {
                    Some(existing) => {
                        if line.quantity > existing.quantity {
                            tx.set_cart_item_quantity(existing.id, line.quantity).await?;
                        }
                    }
                    None => {
                        tx.insert_cart_item(user_cart.id, line.product_id, line.quantity)
                            .await?;
                    }
                }
                merged += 1;
            }
            tx.delete_cart(guest.id).await?;
        }

        let cart = reload(&mut tx, user_cart.id).await?;
        let details = details(&mut tx, cart).await?;
        tx.commit().await?;

        metrics::counter!("cart_merges_total").increment(1);
        tracing::info!(user_id = %principal.user_id, lines = merged, "guest cart merged");
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use common::{SessionId, UserId};
    use store::{InMemoryStore, NewProduct};

    use super::*;

    async fn seed(store: &InMemoryStore, name: &str, price: i64, stock: u32) -> ProductId {
        let mut tx = store.begin().await.unwrap();
        let product = tx
            .insert_product(NewProduct {
                name: name.to_string(),
                description: None,
                price: Money::from_cents(price),
                stock,
                category: "tools".to_string(),
                active: true,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        product.id
    }

    fn guest() -> Caller {
        Caller::session(SessionId::new("guest-1").unwrap())
    }

    #[tokio::test]
    async fn add_same_product_twice_increments_one_line() {
        let store = InMemoryStore::new();
        let hammer = seed(&store, "Hammer", 1299, 10).await;
        let carts = CartService::new(store);
        let user = Caller::user(UserId::new(1));

        carts.add_item(&user, hammer, 2).await.unwrap();
        let cart = carts.add_item(&user, hammer, 3).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].item.quantity, 5);
        assert_eq!(cart.summary.total, Money::from_cents(5 * 1299));
    }

    #[tokio::test]
    async fn totals_that_overflow_are_rejected_and_not_stored() {
        let store = InMemoryStore::new();
        let pricey = seed(&store, "Yacht", i64::MAX / 2, 10).await;
        let carts = CartService::new(store);
        let user = Caller::user(UserId::new(1));

        let err = carts.add_item(&user, pricey, 3).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(ref msg) if msg.contains("too large")));
        assert!(carts.summary(&user).await.unwrap().is_empty);

        let cart = carts.add_item(&user, pricey, 2).await.unwrap();
        assert_eq!(cart.summary.total, Money::from_cents(i64::MAX - 1));
    }

    #[tokio::test]
    async fn add_revalidates_the_combined_quantity() {
        let store = InMemoryStore::new();
        let hammer = seed(&store, "Hammer", 1299, 4).await;
        let carts = CartService::new(store);
        let user = Caller::user(UserId::new(1));

        carts.add_item(&user, hammer, 3).await.unwrap();
        let err = carts.add_item(&user, hammer, 2).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientStock {
                available: 4,
                requested: 5,
                ..
            }
        ));
        assert_eq!(carts.summary(&user).await.unwrap().total_quantity, 3);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let store = InMemoryStore::new();
        let hammer = seed(&store, "Hammer", 1299, 4).await;
        let carts = CartService::new(store);
        let user = Caller::user(UserId::new(1));

        assert!(matches!(
            carts.add_item(&user, hammer, 0).await,
            Err(DomainError::InvalidArgument(_))
        ));
        let cart = carts.add_item(&user, hammer, 1).await.unwrap();
        assert!(matches!(
            carts
                .update_item_quantity(&user, cart.items[0].item.id, 0)
                .await,
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn other_callers_cannot_touch_a_line() {
        let store = InMemoryStore::new();
        let hammer = seed(&store, "Hammer", 1299, 4).await;
        let carts = CartService::new(store);
        let owner = Caller::user(UserId::new(1));
        let intruder = Caller::user(UserId::new(2));

        let cart = carts.add_item(&owner, hammer, 1).await.unwrap();
        let item_id = cart.items[0].item.id;

        assert!(matches!(
            carts.update_item_quantity(&intruder, item_id, 2).await,
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            carts.remove_item(&intruder, item_id).await,
            Err(DomainError::NotFound { .. })
        ));

        let cart = carts.remove_item(&owner, item_id).await.unwrap();
        assert!(cart.summary.is_empty);
    }

    #[tokio::test]
    async fn summary_uses_live_prices() {
        let store = InMemoryStore::new();
        let hammer = seed(&store, "Hammer", 1000, 10).await;
        let saw = seed(&store, "Saw", 2500, 10).await;
        let carts = CartService::new(store.clone());
        let user = Caller::user(UserId::new(1));

        carts.add_item(&user, hammer, 2).await.unwrap();
        carts.add_item(&user, saw, 1).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut product = tx.get_product(hammer).await.unwrap().unwrap();
        product.price = Money::from_cents(1100);
        tx.update_product(&product).await.unwrap();
        tx.commit().await.unwrap();

        let summary = carts.summary(&user).await.unwrap();
        assert_eq!(summary.total_quantity, 3);
        assert_eq!(summary.distinct_items, 2);
        assert_eq!(summary.total, Money::from_cents(4700));
        assert!(!summary.is_empty);
    }

    #[tokio::test]
    async fn clear_always_succeeds() {
        let store = InMemoryStore::new();
        let hammer = seed(&store, "Hammer", 1000, 10).await;
        let carts = CartService::new(store);

        carts.clear(&guest()).await.unwrap();
        carts.add_item(&guest(), hammer, 2).await.unwrap();
        carts.clear(&guest()).await.unwrap();
        assert!(carts.summary(&guest()).await.unwrap().is_empty);
    }

    #[tokio::test]
    async fn merge_takes_the_larger_quantity() {
        let store = InMemoryStore::new();
        let p = seed(&store, "Hammer", 1000, 20).await;
        let carts = CartService::new(store);
        let user_id = UserId::new(1);
        let session = SessionId::new("guest-1").unwrap();

        carts.add_item(&guest(), p, 3).await.unwrap();
        carts.add_item(&Caller::user(user_id), p, 5).await.unwrap();
        let merged = carts
            .merge(&Caller::user(user_id).with_session(session.clone()))
            .await
            .unwrap();
        assert_eq!(merged.items.len(), 1);
        assert_eq!(merged.items[0].item.quantity, 5);

        let other = UserId::new(2);
        carts.add_item(&guest(), p, 7).await.unwrap();
        carts.add_item(&Caller::user(other), p, 5).await.unwrap();
        let merged = carts
            .merge(&Caller::user(other).with_session(session))
            .await
            .unwrap();
        assert_eq!(merged.items[0].item.quantity, 7);
    }

    #[tokio::test]
    async fn merge_requires_user_and_session() {
        let carts = CartService::new(InMemoryStore::new());
        assert!(matches!(
            carts.merge(&guest()).await,
            Err(DomainError::Unauthorized(_))
        ));
        assert!(matches!(
            carts.merge(&Caller::user(UserId::new(1))).await,
            Err(DomainError::InvalidArgument(_))
        ));
    }
}
