//! Domain error types.

use store::StoreError;
use thiserror::Error;

use crate::cart::CartError;
use crate::catalog::CatalogError;
use crate::customer::CustomerError;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The store failed or was unavailable. Never a caller mistake.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Customer error: {0}")]
    Customer(#[from] CustomerError),
}
