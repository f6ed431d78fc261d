use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, CartLineId, CustomerId, Money, OrderId, OrderState, ProductId};

use crate::{
    Brand, Cart, CartLine, Category, Customer, NewProduct, Order, OrderPage, OrderQuery, Product,
    ProductQuery, Result,
};

/// Entry point to a storage backend.
///
/// All implementations must be cheap to clone and thread-safe.
#[async_trait]
pub trait Store: Send + Sync + Clone + 'static {
    type Tx: Transaction;

    /// Opens a transaction.
    ///
    /// Failure here means storage is unavailable; it is not retried.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A unit of work spanning every repository.
///
/// Reads see the transaction's own writes. Dropping the transaction without
/// calling `commit` discards all of them.
#[async_trait]
pub trait Transaction:
    CatalogRepository + CartRepository + OrderRepository + CustomerRepository + Send
{
    async fn commit(self) -> Result<()>;
}

/// Brands, categories and products.
#[async_trait]
pub trait CatalogRepository {
    /// Fails with a unique violation on a duplicate name.
    async fn insert_brand(&mut self, brand: &Brand) -> Result<()>;

    /// Fails with a unique violation on a duplicate name.
    async fn insert_category(&mut self, category: &Category) -> Result<()>;

    /// All brands ordered by name.
    async fn list_brands(&mut self) -> Result<Vec<Brand>>;

    /// All categories ordered by name.
    async fn list_categories(&mut self) -> Result<Vec<Category>>;

    /// Fails with a foreign key violation if the brand or category is unknown.
    async fn insert_product(&mut self, product: NewProduct, now: DateTime<Utc>)
    -> Result<Product>;

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Reads a product and holds it against concurrent writers until the
    /// transaction ends.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Writes every mutable product field including stock.
    async fn update_product(&mut self, product: &Product) -> Result<()>;

    /// Deletes a product and any cart lines holding it. Fails with a foreign
    /// key violation while order lines reference it.
    async fn delete_product(&mut self, id: ProductId) -> Result<bool>;

    /// Available products matching the query, ordered by name.
    async fn search_products(&mut self, query: &ProductQuery) -> Result<Vec<Product>>;

    /// Units ever ordered per product. Products never ordered are absent.
    async fn units_sold(&mut self) -> Result<HashMap<ProductId, u64>>;
}

/// Carts and their lines.
#[async_trait]
pub trait CartRepository {
    async fn insert_cart(&mut self, cart: &Cart) -> Result<()>;

    async fn get_cart(&mut self, id: CartId) -> Result<Option<Cart>>;

    /// Reads a cart and holds it against concurrent writers until the
    /// transaction ends.
    async fn lock_cart(&mut self, id: CartId) -> Result<Option<Cart>>;

    /// The customer's most recently updated cart.
    async fn find_customer_cart(&mut self, customer_id: CustomerId) -> Result<Option<Cart>>;

    async fn touch_cart(&mut self, id: CartId, at: DateTime<Utc>) -> Result<()>;

    /// Deletes a cart together with its lines.
    async fn delete_cart(&mut self, id: CartId) -> Result<bool>;

    async fn get_cart_line(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>>;

    /// Lines of a cart in the order they were added.
    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>>;

    /// Fails with a unique violation if the cart already holds the product.
    async fn insert_cart_line(&mut self, line: &CartLine) -> Result<()>;

    async fn set_cart_line_quantity(&mut self, id: CartLineId, quantity: u32) -> Result<()>;

    /// Moves a line to another cart.
    async fn reassign_cart_line(&mut self, id: CartLineId, cart_id: CartId) -> Result<()>;

    async fn delete_cart_line(&mut self, cart_id: CartId, product_id: ProductId) -> Result<bool>;

    /// Deletes every line of a cart and returns how many there were.
    async fn clear_cart_lines(&mut self, cart_id: CartId) -> Result<u64>;
}

/// Orders and their frozen lines.
#[async_trait]
pub trait OrderRepository {
    /// Normalizes totals, then writes the order and its lines.
    async fn insert_order(&mut self, order: &mut Order) -> Result<()>;

    /// Normalizes totals, then writes state, amounts and cancellation reason.
    /// Lines are immutable once inserted.
    async fn update_order(&mut self, order: &mut Order) -> Result<()>;

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Reads an order and holds it against concurrent writers until the
    /// transaction ends.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    async fn find_order_by_tracking_token(&mut self, token: &str) -> Result<Option<Order>>;

    /// Newest first.
    async fn list_orders(&mut self, query: &OrderQuery) -> Result<OrderPage>;

    async fn order_counts_by_state(&mut self) -> Result<HashMap<OrderState, u64>>;

    async fn count_orders_since(&mut self, since: DateTime<Utc>) -> Result<u64>;

    /// Sum of order totals created since `since` in any of `states`.
    async fn revenue_since(&mut self, since: DateTime<Utc>, states: &[OrderState])
    -> Result<Money>;
}

/// Customer accounts.
#[async_trait]
pub trait CustomerRepository {
    /// Fails with a unique violation on a duplicate email.
    async fn insert_customer(&mut self, customer: &Customer) -> Result<()>;

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>>;

    /// Exact, case-sensitive match.
    async fn find_customer_by_email(&mut self, email: &str) -> Result<Option<Customer>>;

    /// Deletes a customer and their carts. Fails with a foreign key
    /// violation while orders reference the customer.
    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool>;
}
