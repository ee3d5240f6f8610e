//! Inventory ledger: per-product stock, reserved and released inside the
//! caller's transaction.
//!
//! Every function takes the transaction handle of the workflow it supports,
//! so stock moves commit or roll back together with the order they belong to.

use common::ProductId;
use store::{Product, Transaction};

use crate::error::{DomainError, Result};

/// Why a product cannot currently be bought in the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityIssue {
    NotFound {
        product_id: ProductId,
    },
    Inactive {
        product_id: ProductId,
        name: String,
    },
    Insufficient {
        product_id: ProductId,
        name: String,
        available: u32,
        requested: u64,
    },
}

impl std::fmt::Display for AvailabilityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AvailabilityIssue::NotFound { product_id } => {
                write!(f, "product {product_id} not found")
            }
            AvailabilityIssue::Inactive { name, .. } => {
                write!(f, "product '{name}' is no longer active")
            }
            AvailabilityIssue::Insufficient {
                name,
                available,
                requested,
                ..
            } => write!(
                f,
                "insufficient stock for '{name}': available {available}, requested {requested}"
            ),
        }
    }
}

impl From<AvailabilityIssue> for DomainError {
    fn from(issue: AvailabilityIssue) -> Self {
        match issue {
            AvailabilityIssue::NotFound { product_id } => {
                DomainError::not_found("Product", product_id)
            }
            AvailabilityIssue::Inactive { product_id, name } => {
                DomainError::ProductUnavailable { product_id, name }
            }
            AvailabilityIssue::Insufficient {
                product_id,
                name,
                available,
                requested,
            } => DomainError::InsufficientStock {
                product_id,
                name,
                available,
                requested,
            },
        }
    }
}

/// Checks `product` (as loaded for `product_id`) against a requested quantity.
pub(crate) fn availability(
    product_id: ProductId,
    product: Option<&Product>,
    requested: u64,
) -> Option<AvailabilityIssue> {
    let product = match product {
        Some(p) if !p.is_archived() => p,
        _ => return Some(AvailabilityIssue::NotFound { product_id }),
    };
    if !product.active {
        return Some(AvailabilityIssue::Inactive {
            product_id,
            name: product.name.clone(),
        });
    }
    if requested > u64::from(product.stock) {
        return Some(AvailabilityIssue::Insufficient {
            product_id,
            name: product.name.clone(),
            available: product.stock,
            requested,
        });
    }
    None
}

/// Read-only availability check. Returns the issue instead of failing so
/// callers can collect every problem of a cart at once.
pub async fn check_availability<T: Transaction>(
    tx: &mut T,
    product_id: ProductId,
    requested: u64,
) -> Result<Option<AvailabilityIssue>> {
    let product = tx.get_product(product_id).await?;
    Ok(availability(product_id, product.as_ref(), requested))
}

/// Takes `quantity` units out of stock, holding the product row until the
/// transaction ends. Returns the product after the decrement.
#[tracing::instrument(skip(tx))]
pub async fn reserve<T: Transaction>(
    tx: &mut T,
    product_id: ProductId,
    quantity: u32,
) -> Result<Product> {
    if quantity == 0 {
        return Err(DomainError::InvalidArgument(
            "quantity must be at least 1".to_string(),
        ));
    }
    let product = tx.lock_product(product_id).await?;
    if let Some(issue) = availability(product_id, product.as_ref(), u64::from(quantity)) {
        return Err(issue.into());
    }
    let Some(mut product) = product else {
        return Err(DomainError::not_found("Product", product_id));
    };

    product.stock -= quantity;
    tx.update_product(&product).await?;
    tracing::debug!(%product_id, quantity, remaining = product.stock, "stock reserved");
    Ok(product)
}

/// Puts `quantity` units back into stock. Works on archived and inactive
/// products too, so cancelled orders always get their stock back.
#[tracing::instrument(skip(tx))]
pub async fn release<T: Transaction>(
    tx: &mut T,
    product_id: ProductId,
    quantity: u32,
) -> Result<Product> {
    let mut product = tx
        .lock_product(product_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Product", product_id))?;

    product.stock = product
        .stock
        .checked_add(quantity)
        .ok_or_else(|| DomainError::InvalidArgument("stock would overflow".to_string()))?;
    tx.update_product(&product).await?;
    tracing::debug!(%product_id, quantity, stock = product.stock, "stock released");
    Ok(product)
}

/// Applies a signed stock correction. The result must stay non-negative.
#[tracing::instrument(skip(tx))]
pub async fn adjust_stock<T: Transaction>(
    tx: &mut T,
    product_id: ProductId,
    delta: i64,
) -> Result<Product> {
    let mut product = tx
        .lock_product(product_id)
        .await?
        .filter(|p| !p.is_archived())
        .ok_or_else(|| DomainError::not_found("Product", product_id))?;

    let adjusted = i64::from(product.stock).saturating_add(delta);
    if adjusted < 0 {
        return Err(DomainError::InvalidArgument(format!(
            "stock adjustment of {delta} would make stock negative (current {})",
            product.stock
        )));
    }
    product.stock = u32::try_from(adjusted)
        .map_err(|_| DomainError::InvalidArgument("stock would overflow".to_string()))?;
    tx.update_product(&product).await?;
    Ok(product)
}
