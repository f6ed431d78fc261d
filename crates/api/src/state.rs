//! Shared application state.

use common::Money;
use domain::{CartService, CatalogService, CustomerService, OrderService};
use store::Store;

use crate::config::Config;
use crate::session::SessionKeys;

/// Services and settings shared by every handler.
pub struct AppState<S: Store> {
    pub catalog: CatalogService<S>,
    pub carts: CartService<S>,
    pub orders: OrderService<S>,
    pub customers: CustomerService<S>,
    pub sessions: SessionKeys,
    /// Flat shipping charged on every order.
    pub shipping_cost: Money,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            carts: CartService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            customers: CustomerService::new(store),
            sessions: SessionKeys::new(&config.session_secret),
            shipping_cost: config.shipping_cost,
        }
    }
}
