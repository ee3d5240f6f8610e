//! Transactional persistence for the shop.
//!
//! Every read and write goes through a [`Transaction`] opened from a
//! [`Store`]. Two implementations are provided: [`InMemoryStore`] for tests
//! and local runs, and [`PostgresStore`] for production.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, MemoryTransaction};
pub use model::{
    Cart, CartItem, CartOwner, NewOrder, NewOrderItem, NewProduct, NewUser, Order, OrderItem,
    Product, StatusTotal, USERS_EMAIL_UNIQUE, User,
};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use query::{OrderQuery, OrderSortField, ProductQuery, ProductSortField};
pub use store::{Store, Transaction};
