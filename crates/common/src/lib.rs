//! Shared vocabulary for the storefront crates.
//!
//! Identifiers are distinct newtypes over UUIDs so a cart id can never be
//! passed where a product id is expected. Money is kept in integer cents.

mod money;
mod order_state;
mod types;

pub use money::Money;
pub use order_state::{OrderState, ParseOrderStateError};
pub use types::{
    BrandId, CartId, CartLineId, CategoryId, CustomerId, OrderId, OrderLineId, ProductId,
};
