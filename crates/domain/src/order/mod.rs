//! Orders: checkout, direct creation, cancellation, listing and stats.

mod checkout;
mod service;

use std::collections::BTreeMap;

use common::{Money, OrderStatus, ProductId};
use serde::{Deserialize, Serialize};

pub use service::OrderService;

/// One requested line of a directly created order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Partial order update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateOrder {
    pub status: Option<OrderStatus>,
    pub notes: Option<String>,
}

/// Aggregate order figures for one user or the whole shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub total_orders: u64,
    pub by_status: BTreeMap<OrderStatus, u64>,
    /// Sum of the totals of every order that was not cancelled.
    pub total_revenue: Money,
    /// Revenue divided by the number of orders that were not cancelled.
    pub average_order_value: Money,
}

/// Folds duplicate product lines into one, keeping first-seen order.
pub(crate) fn merge_lines(lines: &[OrderLineRequest]) -> Option<Vec<OrderLineRequest>> {
    let mut merged: Vec<OrderLineRequest> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity = existing.quantity.checked_add(line.quantity)?,
            None => merged.push(*line),
        }
    }
    Some(merged)
}
