//! Transactional persistence for the storefront.
//!
//! A [`Store`] hands out [`Transaction`]s. Every repository operation runs
//! inside one, and nothing becomes visible to other transactions until
//! [`Transaction::commit`] succeeds. Dropping a transaction rolls it back.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod repository;

pub use common::{
    BrandId, CartId, CartLineId, CategoryId, CustomerId, Money, OrderId, OrderLineId, OrderState,
    ProductId,
};
pub use error::{Result, StoreError, constraint};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use model::{
    Brand, Cart, CartLine, Category, Customer, NewProduct, Order, OrderLine, Product, Species,
};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use query::{OrderPage, OrderQuery, ProductQuery};
pub use repository::{
    CartRepository, CatalogRepository, CustomerRepository, OrderRepository, Store, Transaction,
};
