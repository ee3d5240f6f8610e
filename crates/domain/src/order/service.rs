//! Order service providing the order API.

use std::collections::BTreeMap;

use chrono::Utc;
use common::{Money, OrderId, OrderStatus, Page};
use store::{Order, OrderQuery, Store, Transaction};

use super::{OrderStats, UpdateOrder};
use crate::context::{Caller, Principal};
use crate::error::{DomainError, Result};
use crate::inventory;

/// Service for managing orders.
///
/// Users see and cancel their own orders; admins see all orders and drive
/// the status lifecycle. Stock moves happen in the same transaction as the
/// order change they belong to.
pub struct OrderService<S: Store> {
    pub(super) store: S,
}

/// Owner or admin, otherwise `Forbidden`.
fn authorize(principal: &Principal, order: &Order) -> Result<()> {
    if principal.is_admin() || order.user_id == principal.user_id {
        Ok(())
    } else {
        Err(DomainError::Forbidden(format!(
            "order {} belongs to another user",
            order.id
        )))
    }
}

async fn locked_order<T: Transaction>(tx: &mut T, id: OrderId) -> Result<Order> {
    tx.lock_order(id)
        .await?
        .ok_or_else(|| DomainError::not_found("Order", id))
}

/// Releases the stock of every line and marks the order cancelled.
async fn cancel_locked<T: Transaction>(tx: &mut T, order: &mut Order) -> Result<()> {
    match order.status {
        OrderStatus::Delivered => {
            return Err(DomainError::InvalidState(
                "cannot cancel delivered order".to_string(),
            ));
        }
        OrderStatus::Cancelled => {
            return Err(DomainError::InvalidState(
                "order is already cancelled".to_string(),
            ));
        }
        _ => {}
    }
    for item in &order.items {
        inventory::release(tx, item.product_id, item.quantity).await?;
    }
    order.status = OrderStatus::Cancelled;
    order.updated_at = Utc::now();
    tx.update_order(order).await?;
    Ok(())
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lists orders. Non-admins only ever see their own orders.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, caller: &Caller, mut query: OrderQuery) -> Result<Page<Order>> {
        let principal = caller.require_user()?;
        if !principal.is_admin() {
            query.user_id = Some(principal.user_id);
        }
        let mut tx = self.store.begin().await?;
        let (items, total) = tx.list_orders(&query).await?;
        Ok(Page::new(items, total, query.page))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, caller: &Caller, id: OrderId) -> Result<Order> {
        let principal = caller.require_user()?;
        let mut tx = self.store.begin().await?;
        let order = tx
            .get_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;
        authorize(&principal, &order)?;
        Ok(order)
    }

    /// Updates notes (owner or admin) and status (admin only).
    ///
    /// Status changes follow the lifecycle edges. Moving to `CANCELLED`
    /// runs the cancellation workflow, so stock is released. Completed and
    /// cancelled orders never change again.
    #[tracing::instrument(skip(self, input))]
    pub async fn update(&self, caller: &Caller, id: OrderId, input: UpdateOrder) -> Result<Order> {
        let principal = caller.require_user()?;
        if input.status.is_some() && !principal.is_admin() {
            return Err(DomainError::Forbidden(
                "only admins can change order status".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let mut order = locked_order(&mut tx, id).await?;
        authorize(&principal, &order)?;
        if order.status.is_terminal() {
            return Err(DomainError::InvalidState(
                "cannot modify completed or cancelled orders".to_string(),
            ));
        }

        if let Some(notes) = input.notes {
            order.notes = Some(notes);
            order.updated_at = Utc::now();
            tx.update_order(&order).await?;
        }

        let mut cancelled = false;
        if let Some(target) = input.status
            && target != order.status
        {
            if target == OrderStatus::Cancelled {
                cancel_locked(&mut tx, &mut order).await?;
                cancelled = true;
            } else if order.status.can_transition_to(target) {
                order.status = target;
                order.updated_at = Utc::now();
                tx.update_order(&order).await?;
            } else {
                return Err(DomainError::InvalidState(format!(
                    "cannot change order status from {} to {}",
                    order.status, target
                )));
            }
        }
        tx.commit().await?;

        if cancelled {
            metrics::counter!("orders_cancelled_total").increment(1);
            tracing::info!(order_id = %id, "order cancelled by status change");
        }
        Ok(order)
    }

    /// Admin-only status change.
    pub async fn update_status(
        &self,
        caller: &Caller,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order> {
        caller.require_admin()?;
        self.update(
            caller,
            id,
            UpdateOrder {
                status: Some(status),
                notes: None,
            },
        )
        .await
    }

    /// Cancels an order and puts its stock back. Users may cancel their own
    /// orders, admins any order.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, caller: &Caller, id: OrderId) -> Result<Order> {
        let principal = caller.require_user()?;

        let mut tx = self.store.begin().await?;
        let mut order = locked_order(&mut tx, id).await?;
        authorize(&principal, &order)?;
        cancel_locked(&mut tx, &mut order).await?;
        tx.commit().await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(order_id = %id, user_id = %principal.user_id, "order cancelled");
        Ok(order)
    }

    /// Order figures for the caller, or for the whole shop for admins.
    #[tracing::instrument(skip(self))]
    pub async fn stats(&self, caller: &Caller) -> Result<OrderStats> {
        let principal = caller.require_user()?;
        let scope = (!principal.is_admin()).then_some(principal.user_id);

        let mut tx = self.store.begin().await?;
        let totals = tx.order_status_totals(scope).await?;

        let mut by_status: BTreeMap<OrderStatus, u64> =
            OrderStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut total_orders = 0;
        let mut revenue_orders = 0;
        let mut total_revenue = Money::zero();
        for entry in totals {
            *by_status.entry(entry.status).or_default() += entry.count;
            total_orders += entry.count;
            if entry.status != OrderStatus::Cancelled {
                revenue_orders += entry.count;
                total_revenue = total_revenue
                    .checked_add(entry.total)
                    .ok_or_else(|| DomainError::amount_too_large("total revenue"))?;
            }
        }

        Ok(OrderStats {
            total_orders,
            by_status,
            total_revenue,
            average_order_value: total_revenue.average_over(revenue_orders),
        })
    }
}
