//! Catalog query engine and product management.

mod service;

use common::{BrandId, CategoryId, Money, ProductId};
use serde::{Deserialize, Serialize};
use store::{Product, Species};
use thiserror::Error;

pub use service::{CatalogService, DEFAULT_FEATURED_LIMIT, MAX_PRICE_CENTS, MAX_STOCK};

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Brand not found: {0}")]
    BrandNotFound(BrandId),

    #[error("Category not found: {0}")]
    CategoryNotFound(CategoryId),

    #[error(
        "Invalid price: {cents} cents (must be between 1 and {max})",
        max = MAX_PRICE_CENTS
    )]
    InvalidPrice { cents: i64 },

    #[error("Invalid stock: {stock} (at most {max})", max = MAX_STOCK)]
    InvalidStock { stock: u32 },

    #[error("Name must not be empty")]
    EmptyName,

    #[error("Name already in use: {0}")]
    DuplicateName(String),

    /// Orders reference the product, so it cannot be deleted.
    #[error("Product {0} is referenced by orders")]
    ProductInUse(ProductId),
}

/// A product together with its derived pricing and stock values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub current_price: Money,
    pub on_offer: bool,
    pub discount_percent: f64,
    pub sold_out: bool,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            current_price: product.current_price(),
            on_offer: product.is_on_offer(),
            discount_percent: product.discount_percent(),
            sold_out: product.is_sold_out(),
            product,
        }
    }
}

/// Partial update of a product. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub species: Option<Species>,
    pub price: Option<Money>,
    /// `Some(None)` removes the sale price.
    #[serde(default, deserialize_with = "double_option")]
    pub sale_price: Option<Option<Money>>,
    pub stock: Option<u32>,
    pub available: Option<bool>,
    pub featured: Option<bool>,
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<Money>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Money>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_distinguishes_null_from_absent() {
        let absent: ProductUpdate = serde_json::from_str(r#"{"stock": 3}"#).unwrap();
        assert_eq!(absent.sale_price, None);
        assert_eq!(absent.stock, Some(3));

        let cleared: ProductUpdate = serde_json::from_str(r#"{"sale_price": null}"#).unwrap();
        assert_eq!(cleared.sale_price, Some(None));

        let set: ProductUpdate = serde_json::from_str(r#"{"sale_price": 799}"#).unwrap();
        assert_eq!(set.sale_price, Some(Some(Money::from_cents(799))));
    }
}
