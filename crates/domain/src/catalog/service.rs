//! Catalog service.

use std::cmp::Reverse;

use chrono::Utc;
use common::ProductId;
use store::{
    Brand, CatalogRepository, Category, NewProduct, Product, ProductQuery, Store, StoreError,
    Transaction, constraint,
};

use crate::error::DomainError;

use super::{CatalogError, ProductUpdate};

/// Number of products on the home page when no limit is given.
pub const DEFAULT_FEATURED_LIMIT: usize = 4;

/// Largest accepted price: ten decimal digits of cents.
pub const MAX_PRICE_CENTS: i64 = 9_999_999_999;

/// Largest stock level the database column holds.
pub const MAX_STOCK: u32 = i32::MAX as u32;

fn validate_price(price: common::Money) -> Result<(), CatalogError> {
    if !price.is_positive() || price.cents() > MAX_PRICE_CENTS {
        return Err(CatalogError::InvalidPrice {
            cents: price.cents(),
        });
    }
    Ok(())
}

fn validate_stock(stock: u32) -> Result<u32, CatalogError> {
    if stock > MAX_STOCK {
        return Err(CatalogError::InvalidStock { stock });
    }
    Ok(stock)
}

fn validate_name(name: &str) -> Result<String, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::EmptyName);
    }
    Ok(name.to_string())
}

/// Service for browsing and managing the catalog.
#[derive(Clone)]
pub struct CatalogService<S: Store> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    /// Creates a new catalog service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_brand(&self, name: &str) -> Result<Brand, DomainError> {
        let brand = Brand::new(validate_name(name)?);
        let mut tx = self.store.begin().await?;
        tx.insert_brand(&brand).await.map_err(|e| {
            if e.is_unique_violation(constraint::BRAND_NAME) {
                CatalogError::DuplicateName(brand.name.clone()).into()
            } else {
                DomainError::from(e)
            }
        })?;
        tx.commit().await?;
        Ok(brand)
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_category(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Category, DomainError> {
        let category = Category::new(validate_name(name)?, description.trim());
        let mut tx = self.store.begin().await?;
        tx.insert_category(&category).await.map_err(|e| {
            if e.is_unique_violation(constraint::CATEGORY_NAME) {
                CatalogError::DuplicateName(category.name.clone()).into()
            } else {
                DomainError::from(e)
            }
        })?;
        tx.commit().await?;
        Ok(category)
    }

    pub async fn list_brands(&self) -> Result<Vec<Brand>, DomainError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_brands().await?)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, DomainError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_categories().await?)
    }

    /// Creates a product. Price and any sale price must be positive.
    #[tracing::instrument(skip(self), fields(name = %new.name))]
    pub async fn create_product(&self, mut new: NewProduct) -> Result<Product, DomainError> {
        new.name = validate_name(&new.name)?;
        validate_price(new.price)?;
        if let Some(sale) = new.sale_price {
            validate_price(sale)?;
        }
        validate_stock(new.stock)?;

        let brand_id = new.brand_id;
        let category_id = new.category_id;
        let mut tx = self.store.begin().await?;
        let product = tx
            .insert_product(new, Utc::now())
            .await
            .map_err(|e| match e {
                StoreError::ForeignKeyViolation(ref c) if c == constraint::PRODUCT_BRAND => {
                    CatalogError::BrandNotFound(brand_id).into()
                }
                StoreError::ForeignKeyViolation(ref c) if c == constraint::PRODUCT_CATEGORY => {
                    CatalogError::CategoryNotFound(category_id).into()
                }
                e => DomainError::from(e),
            })?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: ProductId) -> Result<Product, DomainError> {
        let mut tx = self.store.begin().await?;
        Ok(tx
            .get_product(product_id)
            .await?
            .ok_or(CatalogError::ProductNotFound(product_id))?)
    }

    /// Applies a partial update, including stock and availability.
    #[tracing::instrument(skip(self))]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut product = tx
            .lock_product(product_id)
            .await?
            .ok_or(CatalogError::ProductNotFound(product_id))?;

        if let Some(name) = update.name {
            product.name = validate_name(&name)?;
        }
        if let Some(description) = update.description {
            product.description = description;
        }
        if let Some(species) = update.species {
            product.species = species;
        }
        if let Some(price) = update.price {
            validate_price(price)?;
            product.price = price;
        }
        if let Some(sale_price) = update.sale_price {
            if let Some(sale) = sale_price {
                validate_price(sale)?;
            }
            product.sale_price = sale_price;
        }
        if let Some(stock) = update.stock {
            product.stock = validate_stock(stock)?;
        }
        if let Some(available) = update.available {
            product.available = available;
        }
        if let Some(featured) = update.featured {
            product.featured = featured;
        }
        product.updated_at = Utc::now();

        tx.update_product(&product).await?;
        tx.commit().await?;

        tracing::info!(%product_id, stock = product.stock, "product updated");
        Ok(product)
    }

    /// Deletes a product and removes it from every cart.
    ///
    /// Products that appear on any order are kept.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, product_id: ProductId) -> Result<(), DomainError> {
        let mut tx = self.store.begin().await?;
        let deleted = tx.delete_product(product_id).await.map_err(|e| {
            if e.is_foreign_key_violation(constraint::ORDER_LINE_PRODUCT) {
                CatalogError::ProductInUse(product_id).into()
            } else {
                DomainError::from(e)
            }
        })?;
        if !deleted {
            return Err(CatalogError::ProductNotFound(product_id).into());
        }
        tx.commit().await?;

        tracing::info!(%product_id, "product deleted");
        Ok(())
    }

    /// Available products matching the query, ordered by name.
    #[tracing::instrument(skip(self))]
    pub async fn search(&self, query: &ProductQuery) -> Result<Vec<Product>, DomainError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.search_products(query).await?)
    }

    /// Home page selection.
    ///
    /// Candidates are in stock and either flagged, on offer or already sold.
    /// Ranked by flag, then offer, then units sold, then recency.
    #[tracing::instrument(skip(self))]
    pub async fn featured(&self, limit: usize) -> Result<Vec<Product>, DomainError> {
        let mut tx = self.store.begin().await?;
        let sold = tx.units_sold().await?;
        let available = tx.search_products(&ProductQuery::new()).await?;

        let mut candidates: Vec<(u64, Product)> = available
            .into_iter()
            .filter(|p| p.stock > 0)
            .map(|p| (sold.get(&p.id).copied().unwrap_or(0), p))
            .filter(|(units, p)| p.featured || p.is_on_offer() || *units > 0)
            .collect();

        candidates.sort_by_key(|(units, p)| {
            (
                Reverse(p.featured),
                Reverse(p.is_on_offer()),
                Reverse(*units),
                Reverse(p.updated_at),
                Reverse(p.created_at),
            )
        });

        Ok(candidates
            .into_iter()
            .take(limit)
            .map(|(_, p)| p)
            .collect())
    }
}
