//! Cart aggregate: lines, stock validation and merge-on-login.

mod service;

use common::{CartId, CartLineId, CustomerId, Money, ProductId};
use serde::Serialize;
use store::{CartLine, Product};
use thiserror::Error;

pub use service::CartService;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantities below one are rejected, never treated as removal.
    #[error("Invalid quantity: {quantity} (must be at least 1)")]
    InvalidQuantity { quantity: i64 },

    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Product {0} is not in the cart")]
    LineNotFound(ProductId),

    #[error("Product '{name}' is not available")]
    ProductUnavailable { product_id: ProductId, name: String },

    #[error("Insufficient stock for '{name}'. Available: {available}, Requested: {requested}")]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        available: u32,
        requested: u64,
    },

    /// The cart to merge already belongs to a customer.
    #[error("Cart {0} already belongs to a customer")]
    AlreadyOwned(CartId),
}

/// The product side of a cart line, priced at the moment it is read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    pub unit_price: Money,
    pub on_offer: bool,
}

/// A cart line with its subtotal at the product's current price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartItemView {
    pub line_id: CartLineId,
    pub product: ProductSummary,
    pub quantity: u32,
    pub subtotal: Money,
}

impl CartItemView {
    pub(crate) fn new(line: &CartLine, product: &Product) -> Self {
        let unit_price = product.current_price();
        Self {
            line_id: line.id,
            product: ProductSummary {
                id: product.id,
                name: product.name.clone(),
                brand: product.brand_name.clone(),
                unit_price,
                on_offer: product.is_on_offer(),
            },
            quantity: line.quantity,
            subtotal: unit_price.multiply(line.quantity),
        }
    }
}

/// Result of adding to or modifying a cart line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddedItem {
    #[serde(flatten)]
    pub item: CartItemView,
    /// True when the line did not exist before.
    pub created: bool,
    pub message: &'static str,
}

impl AddedItem {
    pub(crate) fn new(item: CartItemView, created: bool) -> Self {
        let message = if created {
            "Product added"
        } else {
            "Quantity updated"
        };
        Self {
            item,
            created,
            message,
        }
    }
}

/// A whole cart with live prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartDetail {
    pub cart_id: CartId,
    pub customer_id: Option<CustomerId>,
    pub items: Vec<CartItemView>,
    /// Sum of quantities, not the number of lines.
    pub total_items: u64,
    pub subtotal: Money,
    pub is_empty: bool,
}

impl CartDetail {
    pub(crate) fn new(
        cart_id: CartId,
        customer_id: Option<CustomerId>,
        items: Vec<CartItemView>,
    ) -> Self {
        let total_items = items.iter().map(|i| u64::from(i.quantity)).sum();
        let subtotal = items.iter().map(|i| i.subtotal).sum();
        Self {
            cart_id,
            customer_id,
            is_empty: items.is_empty(),
            items,
            total_items,
            subtotal,
        }
    }
}

/// Confirmation of a removed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedItem {
    pub product_id: ProductId,
    pub product_name: String,
}

/// Counts from merging an anonymous cart into a customer's cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// The customer's cart, which now holds the merged lines.
    pub cart_id: CartId,
    /// Lines moved over as they were.
    pub items_migrated: u32,
    /// Lines whose product the customer's cart already held.
    pub items_combined: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_carries_both_numbers() {
        let err = CartError::InsufficientStock {
            product_id: ProductId::new(),
            name: "Catnip".to_string(),
            available: 10,
            requested: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("Available: 10"));
        assert!(msg.contains("Requested: 12"));
    }

    #[test]
    fn empty_detail_has_zero_totals() {
        let detail = CartDetail::new(CartId::new(), None, Vec::new());
        assert!(detail.is_empty);
        assert_eq!(detail.total_items, 0);
        assert_eq!(detail.subtotal, Money::zero());
    }
}
