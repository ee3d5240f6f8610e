//! Shared application state.

use domain::{AuthConfig, AuthService, CartService, CatalogService, OrderService};
use store::{Store, StoreError};

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub auth: AuthService<S>,
    pub catalog: CatalogService<S>,
    pub carts: CartService<S>,
    pub orders: OrderService<S>,
    store: S,
}

impl<S: Store + Clone> AppState<S> {
    /// Builds every service over clones of one store.
    pub fn new(store: S, auth: &AuthConfig) -> Self {
        Self {
            auth: AuthService::new(store.clone(), auth),
            catalog: CatalogService::new(store.clone()),
            carts: CartService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            store,
        }
    }
}

impl<S: Store> AppState<S> {
    /// Opens and drops a transaction to check that the store is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.begin().await.map(drop)
    }
}
