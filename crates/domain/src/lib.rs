//! Core storefront logic.
//!
//! Each service is generic over a [`store::Store`] and runs every operation
//! in its own transaction, re-reading live stock and cart state each time:
//! - [`CatalogService`]: product search, featured selection and management
//! - [`CartService`]: cart lines, stock validation and merge-on-login
//! - [`OrderService`]: checkout, the order state machine and statistics
//! - [`CustomerService`]: registration and login keyed by email

pub mod cart;
pub mod catalog;
pub mod customer;
pub mod error;
pub mod order;

pub use cart::{
    AddedItem, CartDetail, CartError, CartItemView, CartService, MergeOutcome, RemovedItem,
};
pub use catalog::{CatalogError, CatalogService, ProductUpdate, ProductView};
pub use common::{
    BrandId, CartId, CartLineId, CategoryId, CustomerId, Money, OrderId, OrderLineId, OrderState,
    ProductId,
};
pub use customer::{CustomerError, CustomerService, Registration};
pub use error::DomainError;
pub use order::{
    BulkAction, BulkOutcome, BulkStatus, CheckoutDetails, OrderError, OrderService,
    OrderStatistics,
};
