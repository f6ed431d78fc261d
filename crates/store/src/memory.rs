use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    BrandId, CartId, CartLineId, CategoryId, CustomerId, Money, OrderId, OrderState, ProductId,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Brand, Cart, CartLine, CartRepository, Category, CatalogRepository, Customer,
    CustomerRepository, NewProduct, Order, OrderPage, OrderQuery, OrderRepository, Product,
    ProductQuery, Result, Store, StoreError, Transaction, constraint,
};

#[derive(Debug, Clone, Default)]
struct State {
    brands: HashMap<BrandId, Brand>,
    categories: HashMap<CategoryId, Category>,
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    cart_lines: HashMap<CartLineId, CartLine>,
    orders: HashMap<OrderId, Order>,
    customers: HashMap<CustomerId, Customer>,
}

/// In-memory store for tests and database-less runs.
///
/// Transactions are fully serialized: `begin` waits for the previous
/// transaction to finish. Writes land in a private copy of the data that
/// replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of products stored.
    pub async fn product_count(&self) -> usize {
        self.state.lock().await.products.len()
    }

    /// Returns the number of cart lines stored across all carts.
    pub async fn cart_line_count(&self) -> usize {
        self.state.lock().await.cart_lines.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction { guard, working })
    }
}

/// A transaction on an [`InMemoryStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn commit(self) -> Result<()> {
        let InMemoryTransaction { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

impl InMemoryTransaction {
    fn hydrate_order(&self, order: &Order) -> Order {
        let mut order = order.clone();
        if let Some(customer) = self.working.customers.get(&order.customer_id) {
            order.customer_email = customer.email.clone();
        }
        order
    }
}

#[async_trait]
impl CatalogRepository for InMemoryTransaction {
    async fn insert_brand(&mut self, brand: &Brand) -> Result<()> {
        if self.working.brands.values().any(|b| b.name == brand.name) {
            return Err(StoreError::UniqueViolation(constraint::BRAND_NAME.into()));
        }
        self.working.brands.insert(brand.id, brand.clone());
        Ok(())
    }

    async fn insert_category(&mut self, category: &Category) -> Result<()> {
        if self
            .working
            .categories
            .values()
            .any(|c| c.name == category.name)
        {
            return Err(StoreError::UniqueViolation(
                constraint::CATEGORY_NAME.into(),
            ));
        }
        self.working.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn list_brands(&mut self) -> Result<Vec<Brand>> {
        let mut brands: Vec<_> = self.working.brands.values().cloned().collect();
        brands.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(brands)
    }

    async fn list_categories(&mut self) -> Result<Vec<Category>> {
        let mut categories: Vec<_> = self.working.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn insert_product(&mut self, new: NewProduct, now: DateTime<Utc>) -> Result<Product> {
        let brand_name = self
            .working
            .brands
            .get(&new.brand_id)
            .map(|b| b.name.clone())
            .ok_or_else(|| StoreError::ForeignKeyViolation(constraint::PRODUCT_BRAND.into()))?;
        let category_name = self
            .working
            .categories
            .get(&new.category_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                StoreError::ForeignKeyViolation(constraint::PRODUCT_CATEGORY.into())
            })?;

        let product = Product {
            id: ProductId::new(),
            name: new.name,
            description: new.description,
            brand_id: new.brand_id,
            brand_name,
            category_id: new.category_id,
            category_name,
            species: new.species,
            color: new.color,
            material: new.material,
            price: new.price,
            sale_price: new.sale_price,
            stock: new.stock,
            available: new.available,
            featured: new.featured,
            created_at: now,
            updated_at: now,
        };
        self.working.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        self.get_product(id).await
    }

    async fn update_product(&mut self, product: &Product) -> Result<()> {
        let stored = self
            .working
            .products
            .get_mut(&product.id)
            .ok_or(StoreError::MissingRow("products"))?;
        let brand_name = std::mem::take(&mut stored.brand_name);
        let category_name = std::mem::take(&mut stored.category_name);
        *stored = Product {
            brand_id: stored.brand_id,
            category_id: stored.category_id,
            brand_name,
            category_name,
            ..product.clone()
        };
        Ok(())
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<bool> {
        let referenced = self
            .working
            .orders
            .values()
            .any(|o| o.lines.iter().any(|l| l.product_id == id));
        if referenced {
            return Err(StoreError::ForeignKeyViolation(
                constraint::ORDER_LINE_PRODUCT.into(),
            ));
        }
        let removed = self.working.products.remove(&id).is_some();
        if removed {
            self.working.cart_lines.retain(|_, l| l.product_id != id);
        }
        Ok(removed)
    }

    async fn search_products(&mut self, query: &ProductQuery) -> Result<Vec<Product>> {
        let needle = query.text.as_deref().map(str::to_lowercase);
        let mut products: Vec<_> = self
            .working
            .products
            .values()
            .filter(|p| {
                if !p.available {
                    return false;
                }
                if let Some(ref needle) = needle
                    && !p.name.to_lowercase().contains(needle)
                    && !p.description.to_lowercase().contains(needle)
                    && !p.brand_name.to_lowercase().contains(needle)
                {
                    return false;
                }
                if let Some(brand_id) = query.brand_id
                    && p.brand_id != brand_id
                {
                    return false;
                }
                if let Some(category_id) = query.category_id
                    && p.category_id != category_id
                {
                    return false;
                }
                if let Some(species) = query.species
                    && p.species != species
                {
                    return false;
                }
                true
            })
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn units_sold(&mut self) -> Result<HashMap<ProductId, u64>> {
        let mut sold = HashMap::new();
        for line in self.working.orders.values().flat_map(|o| &o.lines) {
            *sold.entry(line.product_id).or_insert(0) += u64::from(line.quantity);
        }
        Ok(sold)
    }
}

#[async_trait]
impl CartRepository for InMemoryTransaction {
    async fn insert_cart(&mut self, cart: &Cart) -> Result<()> {
        if let Some(customer_id) = cart.customer_id
            && !self.working.customers.contains_key(&customer_id)
        {
            return Err(StoreError::ForeignKeyViolation(
                constraint::CART_CUSTOMER.into(),
            ));
        }
        self.working.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn get_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.working.carts.get(&id).cloned())
    }

    async fn lock_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        self.get_cart(id).await
    }

    async fn find_customer_cart(&mut self, customer_id: CustomerId) -> Result<Option<Cart>> {
        Ok(self
            .working
            .carts
            .values()
            .filter(|c| c.customer_id == Some(customer_id))
            .max_by_key(|c| (c.updated_at, c.created_at))
            .cloned())
    }

    async fn touch_cart(&mut self, id: CartId, at: DateTime<Utc>) -> Result<()> {
        let cart = self
            .working
            .carts
            .get_mut(&id)
            .ok_or(StoreError::MissingRow("carts"))?;
        cart.updated_at = at;
        Ok(())
    }

    async fn delete_cart(&mut self, id: CartId) -> Result<bool> {
        let removed = self.working.carts.remove(&id).is_some();
        self.working.cart_lines.retain(|_, l| l.cart_id != id);
        Ok(removed)
    }

    async fn get_cart_line(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>> {
        Ok(self
            .working
            .cart_lines
            .values()
            .find(|l| l.cart_id == cart_id && l.product_id == product_id)
            .cloned())
    }

    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let mut lines: Vec<_> = self
            .working
            .cart_lines
            .values()
            .filter(|l| l.cart_id == cart_id)
            .cloned()
            .collect();
        lines.sort_by(|a, b| a.added_at.cmp(&b.added_at).then(a.id.cmp(&b.id)));
        Ok(lines)
    }

    async fn insert_cart_line(&mut self, line: &CartLine) -> Result<()> {
        if !self.working.carts.contains_key(&line.cart_id) {
            return Err(StoreError::ForeignKeyViolation(
                constraint::CART_LINE_CART.into(),
            ));
        }
        if !self.working.products.contains_key(&line.product_id) {
            return Err(StoreError::ForeignKeyViolation(
                constraint::CART_LINE_PRODUCT.into(),
            ));
        }
        let duplicate = self
            .working
            .cart_lines
            .values()
            .any(|l| l.cart_id == line.cart_id && l.product_id == line.product_id);
        if duplicate {
            return Err(StoreError::UniqueViolation(
                constraint::CART_LINE_UNIQUE.into(),
            ));
        }
        self.working.cart_lines.insert(line.id, line.clone());
        Ok(())
    }

    async fn set_cart_line_quantity(&mut self, id: CartLineId, quantity: u32) -> Result<()> {
        let line = self
            .working
            .cart_lines
            .get_mut(&id)
            .ok_or(StoreError::MissingRow("cart_lines"))?;
        line.quantity = quantity;
        Ok(())
    }

    async fn reassign_cart_line(&mut self, id: CartLineId, cart_id: CartId) -> Result<()> {
        if !self.working.carts.contains_key(&cart_id) {
            return Err(StoreError::ForeignKeyViolation(
                constraint::CART_LINE_CART.into(),
            ));
        }
        let product_id = self
            .working
            .cart_lines
            .get(&id)
            .map(|l| l.product_id)
            .ok_or(StoreError::MissingRow("cart_lines"))?;
        let duplicate = self
            .working
            .cart_lines
            .values()
            .any(|l| l.id != id && l.cart_id == cart_id && l.product_id == product_id);
        if duplicate {
            return Err(StoreError::UniqueViolation(
                constraint::CART_LINE_UNIQUE.into(),
            ));
        }
        if let Some(line) = self.working.cart_lines.get_mut(&id) {
            line.cart_id = cart_id;
        }
        Ok(())
    }

    async fn delete_cart_line(&mut self, cart_id: CartId, product_id: ProductId) -> Result<bool> {
        let before = self.working.cart_lines.len();
        self.working
            .cart_lines
            .retain(|_, l| !(l.cart_id == cart_id && l.product_id == product_id));
        Ok(self.working.cart_lines.len() < before)
    }

    async fn clear_cart_lines(&mut self, cart_id: CartId) -> Result<u64> {
        let before = self.working.cart_lines.len();
        self.working.cart_lines.retain(|_, l| l.cart_id != cart_id);
        Ok((before - self.working.cart_lines.len()) as u64)
    }
}

#[async_trait]
impl OrderRepository for InMemoryTransaction {
    async fn insert_order(&mut self, order: &mut Order) -> Result<()> {
        order.normalize();

        if !self.working.customers.contains_key(&order.customer_id) {
            return Err(StoreError::ForeignKeyViolation(
                constraint::ORDER_CUSTOMER.into(),
            ));
        }
        if let Some(line) = order
            .lines
            .iter()
            .find(|l| !self.working.products.contains_key(&l.product_id))
        {
            tracing::debug!(product_id = %line.product_id, "order line references unknown product");
            return Err(StoreError::ForeignKeyViolation(
                constraint::ORDER_LINE_PRODUCT.into(),
            ));
        }
        for existing in self.working.orders.values() {
            if existing.order_number == order.order_number {
                return Err(StoreError::UniqueViolation(constraint::ORDER_NUMBER.into()));
            }
            if existing.tracking_token == order.tracking_token {
                return Err(StoreError::UniqueViolation(
                    constraint::ORDER_TRACKING_TOKEN.into(),
                ));
            }
        }

        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &mut Order) -> Result<()> {
        order.normalize();

        let stored = self
            .working
            .orders
            .get_mut(&order.id)
            .ok_or(StoreError::MissingRow("orders"))?;
        stored.state = order.state;
        stored.subtotal = order.subtotal;
        stored.taxes = order.taxes;
        stored.shipping_cost = order.shipping_cost;
        stored.discount = order.discount;
        stored.total = order.total;
        stored.shipping_address = order.shipping_address.clone();
        stored.phone = order.phone.clone();
        stored.cancellation_reason = order.cancellation_reason.clone();
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .get(&id)
            .map(|o| self.hydrate_order(o)))
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.get_order(id).await
    }

    async fn find_order_by_tracking_token(&mut self, token: &str) -> Result<Option<Order>> {
        Ok(self
            .working
            .orders
            .values()
            .find(|o| o.tracking_token == token)
            .map(|o| self.hydrate_order(o)))
    }

    async fn list_orders(&mut self, query: &OrderQuery) -> Result<OrderPage> {
        let mut matching: Vec<_> = self
            .working
            .orders
            .values()
            .map(|o| self.hydrate_order(o))
            .filter(|o| query.matches(o))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.order_number.cmp(&a.order_number))
        });

        let total = matching.len() as u64;
        let orders = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect();

        Ok(OrderPage {
            orders,
            total,
            page: query.page.max(1),
            page_size: query.limit(),
        })
    }

    async fn order_counts_by_state(&mut self) -> Result<HashMap<OrderState, u64>> {
        let mut counts = HashMap::new();
        for order in self.working.orders.values() {
            *counts.entry(order.state).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_orders_since(&mut self, since: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.created_at >= since)
            .count() as u64)
    }

    async fn revenue_since(
        &mut self,
        since: DateTime<Utc>,
        states: &[OrderState],
    ) -> Result<Money> {
        Ok(self
            .working
            .orders
            .values()
            .filter(|o| o.created_at >= since && states.contains(&o.state))
            .map(|o| o.total)
            .sum())
    }
}

#[async_trait]
impl CustomerRepository for InMemoryTransaction {
    async fn insert_customer(&mut self, customer: &Customer) -> Result<()> {
        if self
            .working
            .customers
            .values()
            .any(|c| c.email == customer.email)
        {
            return Err(StoreError::UniqueViolation(
                constraint::CUSTOMER_EMAIL.into(),
            ));
        }
        self.working.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.working.customers.get(&id).cloned())
    }

    async fn find_customer_by_email(&mut self, email: &str) -> Result<Option<Customer>> {
        Ok(self
            .working
            .customers
            .values()
            .find(|c| c.email == email)
            .cloned())
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool> {
        if self.working.orders.values().any(|o| o.customer_id == id) {
            return Err(StoreError::ForeignKeyViolation(
                constraint::ORDER_CUSTOMER.into(),
            ));
        }
        let removed = self.working.customers.remove(&id).is_some();
        if removed {
            let carts: Vec<CartId> = self
                .working
                .carts
                .values()
                .filter(|c| c.customer_id == Some(id))
                .map(|c| c.id)
                .collect();
            for cart_id in carts {
                self.working.carts.remove(&cart_id);
                self.working.cart_lines.retain(|_, l| l.cart_id != cart_id);
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrderLine, Species};

    async fn seed_product(tx: &mut InMemoryTransaction, name: &str, stock: u32) -> Product {
        let brand = Brand::new(format!("{name} brand"));
        let category = Category::new(format!("{name} category"), "");
        tx.insert_brand(&brand).await.unwrap();
        tx.insert_category(&category).await.unwrap();
        tx.insert_product(
            NewProduct {
                name: name.to_string(),
                description: format!("{name} description"),
                brand_id: brand.id,
                category_id: category.id,
                species: Species::Dog,
                color: String::new(),
                material: String::new(),
                price: Money::from_cents(1000),
                sale_price: None,
                stock,
                available: true,
                featured: false,
            },
            Utc::now(),
        )
        .await
        .unwrap()
    }

    fn customer(email: &str) -> Customer {
        Customer {
            id: CustomerId::new(),
            email: email.to_string(),
            password_hash: String::new(),
            name: String::new(),
            surname: String::new(),
            phone: String::new(),
            address: String::new(),
            city: String::new(),
            postal_code: String::new(),
            is_staff: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn commit_publishes_writes() {
        let store = InMemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        seed_product(&mut tx, "Kibble", 5).await;
        tx.commit().await.unwrap();

        assert_eq!(store.product_count().await, 1);
    }

    #[tokio::test]
    async fn drop_without_commit_rolls_back() {
        let store = InMemoryStore::new();

        {
            let mut tx = store.begin().await.unwrap();
            seed_product(&mut tx, "Kibble", 5).await;
        }

        assert_eq!(store.product_count().await, 0);
    }

    #[tokio::test]
    async fn reads_see_own_writes() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let product = seed_product(&mut tx, "Kibble", 5).await;

        let found = tx.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(found.brand_name, "Kibble brand");
    }

    #[tokio::test]
    async fn cart_line_pair_is_unique() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let product = seed_product(&mut tx, "Kibble", 5).await;
        let cart = Cart::new(None, Utc::now());
        tx.insert_cart(&cart).await.unwrap();

        tx.insert_cart_line(&CartLine::new(cart.id, product.id, 1, Utc::now()))
            .await
            .unwrap();
        let err = tx
            .insert_cart_line(&CartLine::new(cart.id, product.id, 2, Utc::now()))
            .await
            .unwrap_err();

        assert!(err.is_unique_violation(constraint::CART_LINE_UNIQUE));
    }

    #[tokio::test]
    async fn deleting_cart_cascades_to_lines() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let product = seed_product(&mut tx, "Kibble", 5).await;
        let cart = Cart::new(None, Utc::now());
        tx.insert_cart(&cart).await.unwrap();
        tx.insert_cart_line(&CartLine::new(cart.id, product.id, 1, Utc::now()))
            .await
            .unwrap();

        assert!(tx.delete_cart(cart.id).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.cart_line_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&customer("a@example.com")).await.unwrap();

        let err = tx
            .insert_customer(&customer("a@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(constraint::CUSTOMER_EMAIL));

        // Lookup is case-sensitive.
        assert!(
            tx.find_customer_by_email("A@example.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn ordered_product_cannot_be_deleted() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let product = seed_product(&mut tx, "Kibble", 5).await;
        let buyer = customer("buyer@example.com");
        tx.insert_customer(&buyer).await.unwrap();

        let now = Utc::now();
        let mut order = Order {
            id: OrderId::new(),
            customer_id: buyer.id,
            customer_email: buyer.email.clone(),
            order_number: "ORD-TEST".to_string(),
            tracking_token: "token".to_string(),
            state: OrderState::Pending,
            subtotal: Money::from_cents(2000),
            taxes: Money::zero(),
            shipping_cost: Money::zero(),
            discount: Money::zero(),
            total: Money::zero(),
            shipping_address: "1 Main St".to_string(),
            phone: "600111222".to_string(),
            cancellation_reason: None,
            lines: vec![OrderLine::new(
                product.id,
                &product.name,
                2,
                Money::from_cents(1000),
            )],
            created_at: now,
            updated_at: now,
        };
        tx.insert_order(&mut order).await.unwrap();
        assert_eq!(order.total, Money::from_cents(2000));

        let err = tx.delete_product(product.id).await.unwrap_err();
        assert!(err.is_foreign_key_violation(constraint::ORDER_LINE_PRODUCT));

        let err = tx.delete_customer(buyer.id).await.unwrap_err();
        assert!(err.is_foreign_key_violation(constraint::ORDER_CUSTOMER));

        assert_eq!(tx.units_sold().await.unwrap().get(&product.id), Some(&2));
    }
}
