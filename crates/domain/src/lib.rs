//! Domain layer for the shop.
//!
//! This crate provides the business workflows on top of the `store` crate:
//! - Caller context and the error taxonomy
//! - Inventory ledger (reserve / release / availability)
//! - Catalog, cart and order services
//! - Checkout and cancellation, each in a single transaction
//! - Account registration and bearer tokens

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod context;
pub mod error;
pub mod inventory;
pub mod order;

pub use auth::{AuthConfig, AuthService, AuthToken, hash_password, verify_password};
pub use cart::{CartDetails, CartLine, CartService, CartSummary, CartValidation};
pub use catalog::{CatalogService, CreateProduct, UpdateProduct};
pub use context::{Caller, Principal};
pub use error::{DomainError, ErrorKind, Result};
pub use inventory::AvailabilityIssue;
pub use order::{OrderLineRequest, OrderService, OrderStats, UpdateOrder};
