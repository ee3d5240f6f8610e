//! Checkout of a cart and direct order creation.

use std::time::Instant;

use common::{ProductId, UserId};
use store::{Cart, CartOwner, NewOrder, NewOrderItem, Order, Store, Transaction};

use super::{OrderLineRequest, OrderService, merge_lines};
use crate::cart::cart_issues;
use crate::context::Caller;
use crate::error::{DomainError, Result};
use crate::inventory;

/// Loads the cart of `user_id`, failing with `EmptyCart` when it has no lines.
async fn load_cart<T: Transaction>(tx: &mut T, user_id: UserId) -> Result<Cart> {
    tx.find_cart(&CartOwner::User(user_id))
        .await?
        .filter(|cart| !cart.is_empty())
        .ok_or(DomainError::EmptyCart)
}

/// Reserves every line and inserts the order with snapshotted unit prices.
///
/// Lines are reserved in product id order so concurrent orders lock product
/// rows in the same sequence.
async fn place_order<T: Transaction>(
    tx: &mut T,
    user_id: UserId,
    notes: Option<String>,
    lines: &[(ProductId, u32)],
) -> Result<Order> {
    let mut lines = lines.to_vec();
    lines.sort_unstable_by_key(|&(product_id, _)| product_id);

    let mut items = Vec::with_capacity(lines.len());
    for (product_id, quantity) in lines {
        let product = inventory::reserve(tx, product_id, quantity).await?;
        items.push(NewOrderItem {
            product_id,
            quantity,
            unit_price: product.price,
        });
    }
    let order = NewOrder::new(user_id, notes, items)
        .ok_or_else(|| DomainError::amount_too_large("order total"))?;
    Ok(tx.insert_order(order).await?)
}

impl<S: Store> OrderService<S> {
    /// Turns the caller's cart into a pending order.
    ///
    /// A cart with any availability issue is rejected with `CheckoutBlocked`
    /// before anything is locked. Reserving stock, creating the order and
    /// emptying the cart then happen in one transaction; a reservation that
    /// loses a race surfaces as its own error and nothing is kept.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, caller: &Caller, notes: Option<String>) -> Result<Order> {
        let principal = caller.require_user()?;
        let start = Instant::now();

        let result = self.checkout_cart(principal.user_id, notes).await;
        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total", "source" => "checkout").increment(1);
                metrics::histogram!("checkout_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id,
                    user_id = %principal.user_id,
                    total = %order.total,
                    "checkout completed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total", "reason" => e.kind().as_str())
                    .increment(1);
                tracing::warn!(user_id = %principal.user_id, error = %e, "checkout failed");
            }
        }
        result
    }

    async fn checkout_cart(&self, user_id: UserId, notes: Option<String>) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let cart = load_cart(&mut tx, user_id).await?;
        let issues = cart_issues(&mut tx, &cart).await?;
        if !issues.is_empty() {
            return Err(DomainError::CheckoutBlocked {
                issues: issues.iter().map(ToString::to_string).collect(),
            });
        }
        // Nothing was written; this only ends the read and its row locks.
        tx.commit().await?;

        // Stock is checked again while reserving; it may have moved since.
        let mut tx = self.store.begin().await?;
        let cart = load_cart(&mut tx, user_id).await?;
        let lines: Vec<_> = cart
            .items
            .iter()
            .map(|item| (item.product_id, item.quantity))
            .collect();
        let order = place_order(&mut tx, user_id, notes, &lines).await?;
        tx.clear_cart_items(cart.id).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Creates an order from explicit lines, bypassing the cart.
    ///
    /// Duplicate product lines are merged first. Every line is checked and
    /// reserved in one transaction; the first failing line aborts the order.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(
        &self,
        caller: &Caller,
        lines: Vec<OrderLineRequest>,
        notes: Option<String>,
    ) -> Result<Order> {
        let principal = caller.require_user()?;
        if lines.is_empty() {
            return Err(DomainError::InvalidArgument(
                "an order needs at least one item".to_string(),
            ));
        }
        if lines.iter().any(|line| line.quantity == 0) {
            return Err(DomainError::InvalidArgument(
                "quantity must be at least 1".to_string(),
            ));
        }
        let lines = merge_lines(&lines)
            .ok_or_else(|| DomainError::InvalidArgument("quantity is too large".to_string()))?;

        let mut tx = self.store.begin().await?;
        let lines: Vec<_> = lines.iter().map(|l| (l.product_id, l.quantity)).collect();
        let order = place_order(&mut tx, principal.user_id, notes, &lines).await?;
        tx.commit().await?;

        metrics::counter!("orders_created_total", "source" => "direct").increment(1);
        tracing::info!(order_id = %order.id, user_id = %principal.user_id, total = %order.total, "order created");
        Ok(order)
    }
}
