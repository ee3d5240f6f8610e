//! Domain error types.

use common::ProductId;
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The referenced entity does not exist or is not visible to the caller.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The caller is known but not allowed to do this.
    #[error("{0}")]
    Forbidden(String),

    /// The caller must authenticate first, or presented bad credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// A request argument is malformed or out of range.
    #[error("{0}")]
    InvalidArgument(String),

    /// The product exists but can no longer be bought.
    #[error("product '{name}' ({product_id}) is no longer active")]
    ProductUnavailable { product_id: ProductId, name: String },

    /// Not enough stock to satisfy the requested quantity.
    #[error(
        "insufficient stock for '{name}' ({product_id}): available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        available: u32,
        requested: u64,
    },

    /// The entity is in a state that does not allow the operation.
    #[error("{0}")]
    InvalidState(String),

    /// Checkout of a cart without items.
    #[error("cart is empty")]
    EmptyCart,

    /// The cart failed validation; every problem is listed.
    #[error("checkout blocked: {}", issues.join("; "))]
    CheckoutBlocked { issues: Vec<String> },

    /// A uniqueness rule was violated (e.g. an email already registered).
    #[error("{0}")]
    Conflict(String),

    /// An unexpected failure outside the store.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse classification of a [`DomainError`], used at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Unauthorized,
    InvalidArgument,
    ProductUnavailable,
    InsufficientStock,
    InvalidState,
    EmptyCart,
    CheckoutBlocked,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::ProductUnavailable => "PRODUCT_UNAVAILABLE",
            ErrorKind::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::EmptyCart => "EMPTY_CART",
            ErrorKind::CheckoutBlocked => "CHECKOUT_BLOCKED",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl DomainError {
    /// An amount of money that no longer fits in cents.
    pub(crate) fn amount_too_large(what: &str) -> Self {
        DomainError::InvalidArgument(format!("{what} is too large"))
    }

    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        DomainError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::Unauthorized(_) => ErrorKind::Unauthorized,
            DomainError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DomainError::ProductUnavailable { .. } => ErrorKind::ProductUnavailable,
            DomainError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            DomainError::InvalidState(_) => ErrorKind::InvalidState,
            DomainError::EmptyCart => ErrorKind::EmptyCart,
            DomainError::CheckoutBlocked { .. } => ErrorKind::CheckoutBlocked,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Internal(_) | DomainError::Store(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
