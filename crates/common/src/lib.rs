//! Shared types for the shop workspace.

pub mod money;
pub mod pagination;
pub mod status;
pub mod types;

pub use money::Money;
pub use pagination::{Page, PageRequest, SortDirection};
pub use status::{OrderStatus, Role, UnknownVariant};
pub use types::{CartId, CartItemId, OrderId, OrderItemId, ProductId, SessionId, UserId};
