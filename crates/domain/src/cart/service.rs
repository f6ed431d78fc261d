//! Cart service.

use std::collections::HashMap;

use chrono::Utc;
use common::{CartId, CustomerId, ProductId};
use store::{
    Cart, CartLine, CartRepository, CatalogRepository, CustomerRepository, Product, Store,
    StoreError, Transaction, constraint,
};

use crate::customer::CustomerError;
use crate::error::DomainError;

use super::{AddedItem, CartDetail, CartError, CartItemView, MergeOutcome, RemovedItem};

/// Validates a caller-supplied quantity.
fn positive_quantity(quantity: i64) -> Result<u64, CartError> {
    if quantity < 1 {
        return Err(CartError::InvalidQuantity { quantity });
    }
    Ok(quantity as u64)
}

fn insufficient_stock(product: &Product, requested: u64) -> CartError {
    metrics::counter!("cart_stock_conflicts_total").increment(1);
    tracing::warn!(
        product_id = %product.id,
        available = product.stock,
        requested,
        "stock conflict"
    );
    CartError::InsufficientStock {
        product_id: product.id,
        name: product.name.clone(),
        available: product.stock,
        requested,
    }
}

/// Service for managing shopping carts.
///
/// Carts never reserve stock. Every mutation re-reads the product inside the
/// same transaction as the write, holding it until commit.
#[derive(Clone)]
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    /// Creates a new cart service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Resolves a cart: the explicit one if given, else the customer's most
    /// recent cart, else a fresh cart (anonymous when there is no customer).
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(
        &self,
        customer_id: Option<CustomerId>,
        cart_id: Option<CartId>,
    ) -> Result<Cart, DomainError> {
        let mut tx = self.store.begin().await?;

        if let Some(cart_id) = cart_id {
            return tx
                .get_cart(cart_id)
                .await?
                .ok_or_else(|| CartError::CartNotFound(cart_id).into());
        }

        if let Some(customer_id) = customer_id
            && let Some(cart) = tx.find_customer_cart(customer_id).await?
        {
            return Ok(cart);
        }

        let cart = Cart::new(customer_id, Utc::now());
        tx.insert_cart(&cart).await.map_err(|e| match e {
            e if e.is_foreign_key_violation(constraint::CART_CUSTOMER) => {
                DomainError::from(CustomerError::NotFound)
            }
            e => e.into(),
        })?;
        tx.commit().await?;

        tracing::info!(cart_id = %cart.id, anonymous = cart.is_anonymous(), "cart created");
        Ok(cart)
    }

    /// Adds `quantity` units of a product, creating the line or growing it.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<AddedItem, DomainError> {
        let quantity = positive_quantity(quantity)?;
        let mut tx = self.store.begin().await?;

        tx.lock_cart(cart_id)
            .await?
            .ok_or(CartError::CartNotFound(cart_id))?;
        let product = tx
            .lock_product(product_id)
            .await?
            .ok_or(CartError::ProductNotFound(product_id))?;

        if product.is_sold_out() {
            return Err(CartError::ProductUnavailable {
                product_id,
                name: product.name,
            }
            .into());
        }

        let existing = tx.get_cart_line(cart_id, product_id).await?;
        let current = existing.as_ref().map_or(0, |l| u64::from(l.quantity));
        let requested = current + quantity;
        if requested > u64::from(product.stock) {
            return Err(insufficient_stock(&product, requested).into());
        }
        // Bounded by stock above.
        let new_quantity = requested as u32;

        let now = Utc::now();
        let (line, created) = match existing {
            Some(mut line) => {
                tx.set_cart_line_quantity(line.id, new_quantity).await?;
                line.quantity = new_quantity;
                (line, false)
            }
            None => {
                let line = CartLine::new(cart_id, product_id, new_quantity, now);
                tx.insert_cart_line(&line).await?;
                (line, true)
            }
        };
        tx.touch_cart(cart_id, now).await?;
        tx.commit().await?;

        metrics::counter!("cart_items_added_total").increment(quantity);
        tracing::info!(%cart_id, %product_id, quantity = new_quantity, created, "cart line saved");

        Ok(AddedItem::new(CartItemView::new(&line, &product), created))
    }

    /// Overwrites a line's quantity. Zero or less is an error, not a removal.
    #[tracing::instrument(skip(self))]
    pub async fn modify_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        new_quantity: i64,
    ) -> Result<AddedItem, DomainError> {
        let requested = positive_quantity(new_quantity)?;
        let mut tx = self.store.begin().await?;

        tx.lock_cart(cart_id)
            .await?
            .ok_or(CartError::CartNotFound(cart_id))?;
        let mut line = tx
            .get_cart_line(cart_id, product_id)
            .await?
            .ok_or(CartError::LineNotFound(product_id))?;
        let product = tx
            .lock_product(product_id)
            .await?
            .ok_or(CartError::ProductNotFound(product_id))?;

        if requested > u64::from(product.stock) {
            return Err(insufficient_stock(&product, requested).into());
        }
        line.quantity = requested as u32;

        tx.set_cart_line_quantity(line.id, line.quantity).await?;
        tx.touch_cart(cart_id, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(%cart_id, %product_id, quantity = line.quantity, "cart line updated");
        Ok(AddedItem::new(CartItemView::new(&line, &product), false))
    }

    /// Deletes a line. Fails if the line is already gone.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<RemovedItem, DomainError> {
        let mut tx = self.store.begin().await?;

        if tx.get_cart_line(cart_id, product_id).await?.is_none() {
            return Err(CartError::LineNotFound(product_id).into());
        }
        let product_name = tx
            .get_product(product_id)
            .await?
            .map(|p| p.name)
            .unwrap_or_default();

        tx.delete_cart_line(cart_id, product_id).await?;
        tx.touch_cart(cart_id, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(%cart_id, %product_id, "cart line removed");
        Ok(RemovedItem {
            product_id,
            product_name,
        })
    }

    /// Returns every line priced at the products' current prices.
    #[tracing::instrument(skip(self))]
    pub async fn get_detail(&self, cart_id: CartId) -> Result<CartDetail, DomainError> {
        let mut tx = self.store.begin().await?;

        let cart = tx
            .get_cart(cart_id)
            .await?
            .ok_or(CartError::CartNotFound(cart_id))?;
        let lines = tx.cart_lines(cart_id).await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = tx
                .get_product(line.product_id)
                .await?
                .ok_or(StoreError::MissingRow("products"))?;
            items.push(CartItemView::new(line, &product));
        }

        Ok(CartDetail::new(cart.id, cart.customer_id, items))
    }

    /// Deletes all lines and returns how many there were.
    ///
    /// Always succeeds: an empty or unknown cart yields zero.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, cart_id: CartId) -> Result<u64, DomainError> {
        let mut tx = self.store.begin().await?;

        if tx.lock_cart(cart_id).await?.is_none() {
            return Ok(0);
        }
        let removed = tx.clear_cart_lines(cart_id).await?;
        if removed > 0 {
            tx.touch_cart(cart_id, Utc::now()).await?;
            tx.commit().await?;
        }

        tracing::info!(%cart_id, removed, "cart cleared");
        Ok(removed)
    }

    /// Moves an anonymous cart's lines into the customer's cart and deletes it.
    ///
    /// Lines for products the customer's cart already holds are combined and
    /// capped at current stock; the excess is dropped without error.
    #[tracing::instrument(skip(self))]
    pub async fn merge_on_login(
        &self,
        anonymous_cart_id: CartId,
        customer_id: CustomerId,
    ) -> Result<MergeOutcome, DomainError> {
        let mut tx = self.store.begin().await?;

        let anonymous = tx
            .lock_cart(anonymous_cart_id)
            .await?
            .ok_or(CartError::CartNotFound(anonymous_cart_id))?;
        if !anonymous.is_anonymous() {
            return Err(CartError::AlreadyOwned(anonymous_cart_id).into());
        }
        if tx.get_customer(customer_id).await?.is_none() {
            return Err(CustomerError::NotFound.into());
        }

        let now = Utc::now();
        let target = match tx.find_customer_cart(customer_id).await? {
            Some(cart) => cart,
            None => {
                let cart = Cart::new(Some(customer_id), now);
                tx.insert_cart(&cart).await?;
                cart
            }
        };
        tx.lock_cart(target.id).await?;

        let mut outcome = MergeOutcome {
            cart_id: target.id,
            items_migrated: 0,
            items_combined: 0,
        };

        // Lock products in id order, the same order checkout uses.
        let mut lines = tx.cart_lines(anonymous.id).await?;
        lines.sort_by_key(|l| l.product_id);
        let mut stock = HashMap::with_capacity(lines.len());
        for line in &lines {
            if let Some(product) = tx.lock_product(line.product_id).await? {
                stock.insert(product.id, product.stock);
            }
        }

        for line in lines {
            match tx.get_cart_line(target.id, line.product_id).await? {
                Some(existing) => {
                    let stock = stock.get(&line.product_id).copied().unwrap_or(0);
                    let combined = (u64::from(existing.quantity) + u64::from(line.quantity))
                        .min(u64::from(stock)) as u32;
                    if combined == 0 {
                        tx.delete_cart_line(target.id, line.product_id).await?;
                    } else {
                        tx.set_cart_line_quantity(existing.id, combined).await?;
                    }
                    outcome.items_combined += 1;
                }
                None => {
                    tx.reassign_cart_line(line.id, target.id).await?;
                    outcome.items_migrated += 1;
                }
            }
        }

        tx.delete_cart(anonymous.id).await?;
        tx.touch_cart(target.id, now).await?;
        tx.commit().await?;

        metrics::counter!("cart_merges_total").increment(1);
        tracing::info!(
            from = %anonymous_cart_id,
            to = %target.id,
            migrated = outcome.items_migrated,
            combined = outcome.items_combined,
            "anonymous cart merged"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use store::{Brand, Category, InMemoryStore, NewProduct, Species};

    async fn seed_product(store: &InMemoryStore, stock: u32, available: bool) -> Product {
        seed_priced_product(store, Money::from_cents(500), stock, available).await
    }

    async fn seed_priced_product(
        store: &InMemoryStore,
        price: Money,
        stock: u32,
        available: bool,
    ) -> Product {
        let mut tx = store.begin().await.unwrap();
        let brand = Brand::new(format!("Brand {}", ProductId::new()));
        let category = Category::new(format!("Category {}", ProductId::new()), "");
        tx.insert_brand(&brand).await.unwrap();
        tx.insert_category(&category).await.unwrap();
        let product = tx
            .insert_product(
                NewProduct {
                    name: "Catnip".to_string(),
                    description: "Dried catnip".to_string(),
                    brand_id: brand.id,
                    category_id: category.id,
                    species: Species::Cat,
                    color: String::new(),
                    material: String::new(),
                    price,
                    sale_price: None,
                    stock,
                    available,
                    featured: false,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
        product
    }

    async fn setup(stock: u32) -> (CartService<InMemoryStore>, CartId, Product) {
        let store = InMemoryStore::new();
        let product = seed_product(&store, stock, true).await;
        let service = CartService::new(store);
        let cart = service.get_or_create(None, None).await.unwrap();
        (service, cart.id, product)
    }

    #[tokio::test]
    async fn huge_line_totals_saturate() {
        let store = InMemoryStore::new();
        let price = Money::from_cents(i64::MAX / 2 + 1);
        let product = seed_priced_product(&store, price, 5, true).await;
        let service = CartService::new(store);
        let cart = service.get_or_create(None, None).await.unwrap();

        let added = service.add_item(cart.id, product.id, 2).await.unwrap();
        assert_eq!(added.item.subtotal.cents(), i64::MAX);

        let detail = service.get_detail(cart.id).await.unwrap();
        assert_eq!(detail.subtotal.cents(), i64::MAX);
        assert_eq!(detail.total_items, 2);
    }

    #[tokio::test]
    async fn rejects_non_positive_quantity() {
        let (service, cart_id, product) = setup(5).await;

        for quantity in [0, -3] {
            let err = service
                .add_item(cart_id, product.id, quantity)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                DomainError::Cart(CartError::InvalidQuantity { .. })
            ));
        }
    }

    #[tokio::test]
    async fn first_add_creates_then_increments() {
        let (service, cart_id, product) = setup(5).await;

        let first = service.add_item(cart_id, product.id, 2).await.unwrap();
        assert!(first.created);
        assert_eq!(first.message, "Product added");

        let second = service.add_item(cart_id, product.id, 1).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.message, "Quantity updated");
        assert_eq!(second.item.quantity, 3);
        assert_eq!(second.item.line_id, first.item.line_id);
    }

    #[tokio::test]
    async fn unavailable_product_is_refused() {
        let store = InMemoryStore::new();
        let withdrawn = seed_product(&store, 5, false).await;
        let empty = seed_product(&store, 0, true).await;
        let service = CartService::new(store);
        let cart = service.get_or_create(None, None).await.unwrap();

        for product in [withdrawn, empty] {
            let err = service.add_item(cart.id, product.id, 1).await.unwrap_err();
            assert!(matches!(
                err,
                DomainError::Cart(CartError::ProductUnavailable { .. })
            ));
        }
    }

    #[tokio::test]
    async fn huge_quantity_is_a_stock_conflict() {
        let (service, cart_id, product) = setup(5).await;

        let err = service
            .add_item(cart_id, product.id, i64::MAX)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Cart(CartError::InsufficientStock { available: 5, .. })
        ));
    }

    #[tokio::test]
    async fn missing_cart_and_product_are_not_found() {
        let (service, cart_id, _) = setup(5).await;

        let err = service
            .add_item(CartId::new(), ProductId::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Cart(CartError::CartNotFound(_))));

        let err = service
            .add_item(cart_id, ProductId::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Cart(CartError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn explicit_unknown_cart_is_not_found() {
        let (service, _, _) = setup(5).await;
        let err = service
            .get_or_create(None, Some(CartId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Cart(CartError::CartNotFound(_))));
    }

    #[tokio::test]
    async fn clear_unknown_cart_returns_zero() {
        let (service, _, _) = setup(5).await;
        assert_eq!(service.clear(CartId::new()).await.unwrap(), 0);
    }
}
