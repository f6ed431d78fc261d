use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    BrandId, CartId, CartLineId, CategoryId, CustomerId, Money, OrderId, OrderLineId, OrderState,
    ProductId,
};
use sqlx::{
    PgPool, Postgres, Row,
    postgres::{PgArguments, PgPoolOptions, PgRow},
    query::Query,
};
use uuid::Uuid;

use crate::{
    Brand, Cart, CartLine, CartRepository, Category, CatalogRepository, Customer,
    CustomerRepository, NewProduct, Order, OrderLine, OrderPage, OrderQuery, OrderRepository,
    Product, ProductQuery, Result, Store, StoreError, Transaction,
};

const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.brand_id, b.name AS brand_name,
           p.category_id, c.name AS category_name, p.species, p.color, p.material,
           p.price_cents, p.sale_price_cents, p.stock, p.available, p.featured,
           p.created_at, p.updated_at
    FROM products p
    JOIN brands b ON b.id = p.brand_id
    JOIN categories c ON c.id = p.category_id
"#;

const ORDER_SELECT: &str = r#"
    SELECT o.id, o.customer_id, cu.email AS customer_email, o.order_number, o.tracking_token,
           o.state, o.subtotal_cents, o.taxes_cents, o.shipping_cost_cents, o.discount_cents,
           o.total_cents, o.shipping_address, o.phone, o.cancellation_reason,
           o.created_at, o.updated_at
    FROM orders o
    JOIN customers cu ON cu.id = o.customer_id
"#;

const CUSTOMER_COLUMNS: &str = "id, email, password_hash, name, surname, phone, address, city, \
     postal_code, is_staff, is_active, created_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }
}

/// A transaction on a [`PostgresStore`]. Rolled back on drop unless committed.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::InvalidValue(format!("{column} out of range: {value}")))
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidValue(format!("negative {column}: {value}")))
}

/// Wraps `text` for an ILIKE substring match, escaping wildcards.
fn contains_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    let species: String = row.try_get("species")?;
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        brand_id: BrandId::from_uuid(row.try_get::<Uuid, _>("brand_id")?),
        brand_name: row.try_get("brand_name")?,
        category_id: CategoryId::from_uuid(row.try_get::<Uuid, _>("category_id")?),
        category_name: row.try_get("category_name")?,
        species: species.parse().map_err(StoreError::InvalidValue)?,
        color: row.try_get("color")?,
        material: row.try_get("material")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        sale_price: row
            .try_get::<Option<i64>, _>("sale_price_cents")?
            .map(Money::from_cents),
        stock: to_u32(row.try_get("stock")?, "stock")?,
        available: row.try_get("available")?,
        featured: row.try_get("featured")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart(row: &PgRow) -> Result<Cart> {
    Ok(Cart {
        id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
        customer_id: row
            .try_get::<Option<Uuid>, _>("customer_id")?
            .map(CustomerId::from_uuid),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_cart_line(row: &PgRow) -> Result<CartLine> {
    Ok(CartLine {
        id: CartLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        added_at: row.try_get("added_at")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let state: String = row.try_get("state")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        customer_email: row.try_get("customer_email")?,
        order_number: row.try_get("order_number")?,
        tracking_token: row.try_get("tracking_token")?,
        state: state
            .parse::<OrderState>()
            .map_err(|e| StoreError::InvalidValue(e.to_string()))?,
        subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
        taxes: Money::from_cents(row.try_get("taxes_cents")?),
        shipping_cost: Money::from_cents(row.try_get("shipping_cost_cents")?),
        discount: Money::from_cents(row.try_get("discount_cents")?),
        total: Money::from_cents(row.try_get("total_cents")?),
        shipping_address: row.try_get("shipping_address")?,
        phone: row.try_get("phone")?,
        cancellation_reason: row.try_get("cancellation_reason")?,
        lines: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_line(row: &PgRow) -> Result<OrderLine> {
    Ok(OrderLine {
        id: OrderLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        total: Money::from_cents(row.try_get("total_cents")?),
    })
}

fn row_to_customer(row: &PgRow) -> Result<Customer> {
    Ok(Customer {
        id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        name: row.try_get("name")?,
        surname: row.try_get("surname")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        postal_code: row.try_get("postal_code")?,
        is_staff: row.try_get("is_staff")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Appends the `WHERE` clause for an order listing, numbering parameters from 1.
fn order_filter_sql(sql: &mut String, query: &OrderQuery) {
    let mut param_count = 0;
    sql.push_str(" WHERE 1=1");
    if query.state.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND o.state = ${param_count}"));
    }
    if query.from.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND o.created_at >= ${param_count}"));
    }
    if query.to.is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND o.created_at <= ${param_count}"));
    }
    if query.email_needle().is_some() {
        param_count += 1;
        sql.push_str(&format!(" AND cu.email ILIKE ${param_count}"));
    }
}

/// Binds the parameters written by [`order_filter_sql`], in the same order.
fn bind_order_filters<'q>(
    mut q: Query<'q, Postgres, PgArguments>,
    query: &OrderQuery,
) -> Query<'q, Postgres, PgArguments> {
    if let Some(state) = query.state {
        q = q.bind(state.as_str());
    }
    if let Some(from) = query.from {
        q = q.bind(from);
    }
    if let Some(to) = query.to {
        q = q.bind(to);
    }
    if let Some(needle) = query.email_needle() {
        q = q.bind(contains_pattern(&needle));
    }
    q
}

impl PostgresTransaction {
    async fn fetch_product(&mut self, id: ProductId, lock: bool) -> Result<Option<Product>> {
        let mut sql = format!("{PRODUCT_SELECT} WHERE p.id = $1");
        if lock {
            sql.push_str(" FOR UPDATE OF p");
        }
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn fetch_cart(&mut self, id: CartId, lock: bool) -> Result<Option<Cart>> {
        let mut sql =
            String::from("SELECT id, customer_id, created_at, updated_at FROM carts WHERE id = $1");
        if lock {
            sql.push_str(" FOR UPDATE");
        }
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_cart).transpose()
    }

    /// Attaches lines to already-loaded orders.
    async fn load_order_lines(&mut self, orders: &mut [Order]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, product_name, quantity, unit_price_cents, total_cents
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in &rows {
            let order_id: Uuid = row.try_get("order_id")?;
            by_order
                .entry(order_id)
                .or_default()
                .push(row_to_order_line(row)?);
        }
        for order in orders.iter_mut() {
            order.lines = by_order.remove(&order.id.as_uuid()).unwrap_or_default();
        }
        Ok(())
    }

    async fn fetch_order(&mut self, clause: &str, bind: OrderKey<'_>) -> Result<Option<Order>> {
        let sql = format!("{ORDER_SELECT} {clause}");
        let q = sqlx::query(&sql);
        let q = match bind {
            OrderKey::Id(id) => q.bind(id.as_uuid()),
            OrderKey::Token(token) => q.bind(token.to_string()),
        };
        let row = q.fetch_optional(&mut *self.tx).await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut orders = vec![row_to_order(&row)?];
        self.load_order_lines(&mut orders).await?;
        Ok(orders.pop())
    }
}

enum OrderKey<'a> {
    Id(OrderId),
    Token(&'a str),
}

#[async_trait]
impl CatalogRepository for PostgresTransaction {
    async fn insert_brand(&mut self, brand: &Brand) -> Result<()> {
        sqlx::query("INSERT INTO brands (id, name) VALUES ($1, $2)")
            .bind(brand.id.as_uuid())
            .bind(&brand.name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_category(&mut self, category: &Category) -> Result<()> {
        sqlx::query("INSERT INTO categories (id, name, description) VALUES ($1, $2, $3)")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .bind(&category.description)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn list_brands(&mut self) -> Result<Vec<Brand>> {
        let rows = sqlx::query("SELECT id, name FROM brands ORDER BY name")
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter()
            .map(|row| -> Result<Brand> {
                Ok(Brand {
                    id: BrandId::from_uuid(row.try_get::<Uuid, _>("id")?),
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn list_categories(&mut self) -> Result<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name, description FROM categories ORDER BY name")
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter()
            .map(|row| -> Result<Category> {
                Ok(Category {
                    id: CategoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
                    name: row.try_get("name")?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    async fn insert_product(&mut self, new: NewProduct, now: DateTime<Utc>) -> Result<Product> {
        let id = ProductId::new();
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, brand_id, category_id, species, color,
                                  material, price_cents, sale_price_cents, stock, available,
                                  featured, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
            "#,
        )
        .bind(id.as_uuid())
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.brand_id.as_uuid())
        .bind(new.category_id.as_uuid())
        .bind(new.species.as_str())
        .bind(&new.color)
        .bind(&new.material)
        .bind(new.price.cents())
        .bind(new.sale_price.map(|m| m.cents()))
        .bind(to_i32(new.stock, "stock")?)
        .bind(new.available)
        .bind(new.featured)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        self.fetch_product(id, false)
            .await?
            .ok_or(StoreError::MissingRow("products"))
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        self.fetch_product(id, false).await
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        self.fetch_product(id, true).await
    }

    async fn update_product(&mut self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, species = $4, color = $5, material = $6,
                price_cents = $7, sale_price_cents = $8, stock = $9, available = $10,
                featured = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.species.as_str())
        .bind(&product.color)
        .bind(&product.material)
        .bind(product.price.cents())
        .bind(product.sale_price.map(|m| m.cents()))
        .bind(to_i32(product.stock, "stock")?)
        .bind(product.available)
        .bind(product.featured)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow("products"));
        }
        Ok(())
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_products(&mut self, query: &ProductQuery) -> Result<Vec<Product>> {
        let mut sql = format!("{PRODUCT_SELECT} WHERE p.available");
        let mut param_count = 0;

        if query.text.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND (p.name ILIKE ${param_count} OR p.description ILIKE ${param_count} \
                 OR b.name ILIKE ${param_count})"
            ));
        }
        if query.brand_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND p.brand_id = ${param_count}"));
        }
        if query.category_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND p.category_id = ${param_count}"));
        }
        if query.species.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND p.species = ${param_count}"));
        }
        sql.push_str(" ORDER BY p.name, p.id");

        let mut q = sqlx::query(&sql);
        if let Some(ref text) = query.text {
            q = q.bind(contains_pattern(text));
        }
        if let Some(brand_id) = query.brand_id {
            q = q.bind(brand_id.as_uuid());
        }
        if let Some(category_id) = query.category_id {
            q = q.bind(category_id.as_uuid());
        }
        if let Some(species) = query.species {
            q = q.bind(species.as_str());
        }

        let rows = q.fetch_all(&mut *self.tx).await?;
        rows.iter().map(row_to_product).collect()
    }

    async fn units_sold(&mut self) -> Result<HashMap<ProductId, u64>> {
        let rows = sqlx::query(
            "SELECT product_id, SUM(quantity)::BIGINT AS sold FROM order_lines GROUP BY product_id",
        )
        .fetch_all(&mut *self.tx)
        .await?;

        let mut sold = HashMap::with_capacity(rows.len());
        for row in &rows {
            let product_id = ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?);
            let units: i64 = row.try_get("sold")?;
            sold.insert(product_id, units.max(0) as u64);
        }
        Ok(sold)
    }
}

#[async_trait]
impl CartRepository for PostgresTransaction {
    async fn insert_cart(&mut self, cart: &Cart) -> Result<()> {
        sqlx::query(
            "INSERT INTO carts (id, customer_id, created_at, updated_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(cart.id.as_uuid())
        .bind(cart.customer_id.map(|c| c.as_uuid()))
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        self.fetch_cart(id, false).await
    }

    async fn lock_cart(&mut self, id: CartId) -> Result<Option<Cart>> {
        self.fetch_cart(id, true).await
    }

    async fn find_customer_cart(&mut self, customer_id: CustomerId) -> Result<Option<Cart>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, created_at, updated_at
            FROM carts
            WHERE customer_id = $1
            ORDER BY updated_at DESC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_cart).transpose()
    }

    async fn touch_cart(&mut self, id: CartId, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE carts SET updated_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow("carts"));
        }
        Ok(())
    }

    async fn delete_cart(&mut self, id: CartId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_cart_line(
        &mut self,
        cart_id: CartId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>> {
        let row = sqlx::query(
            r#"
            SELECT id, cart_id, product_id, quantity, added_at
            FROM cart_lines
            WHERE cart_id = $1 AND product_id = $2
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_cart_line).transpose()
    }

    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id, cart_id, product_id, quantity, added_at
            FROM cart_lines
            WHERE cart_id = $1
            ORDER BY added_at, id
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_cart_line).collect()
    }

    async fn insert_cart_line(&mut self, line: &CartLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_lines (id, cart_id, product_id, quantity, added_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.cart_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(to_i32(line.quantity, "quantity")?)
        .bind(line.added_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn set_cart_line_quantity(&mut self, id: CartLineId, quantity: u32) -> Result<()> {
        let result = sqlx::query("UPDATE cart_lines SET quantity = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(to_i32(quantity, "quantity")?)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow("cart_lines"));
        }
        Ok(())
    }

    async fn reassign_cart_line(&mut self, id: CartLineId, cart_id: CartId) -> Result<()> {
        let result = sqlx::query("UPDATE cart_lines SET cart_id = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(cart_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow("cart_lines"));
        }
        Ok(())
    }

    async fn delete_cart_line(&mut self, cart_id: CartId, product_id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id.as_uuid())
            .bind(product_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart_lines(&mut self, cart_id: CartId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderRepository for PostgresTransaction {
    async fn insert_order(&mut self, order: &mut Order) -> Result<()> {
        order.normalize();

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, order_number, tracking_token, state,
                                subtotal_cents, taxes_cents, shipping_cost_cents, discount_cents,
                                total_cents, shipping_address, phone, cancellation_reason,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(&order.order_number)
        .bind(&order.tracking_token)
        .bind(order.state.as_str())
        .bind(order.subtotal.cents())
        .bind(order.taxes.cents())
        .bind(order.shipping_cost.cents())
        .bind(order.discount.cents())
        .bind(order.total.cents())
        .bind(&order.shipping_address)
        .bind(&order.phone)
        .bind(&order.cancellation_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for (line_no, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (id, order_id, line_no, product_id, product_name,
                                         quantity, unit_price_cents, total_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(line_no as i32)
            .bind(line.product_id.as_uuid())
            .bind(&line.product_name)
            .bind(to_i32(line.quantity, "quantity")?)
            .bind(line.unit_price.cents())
            .bind(line.total.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn update_order(&mut self, order: &mut Order) -> Result<()> {
        order.normalize();

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET state = $2, subtotal_cents = $3, taxes_cents = $4, shipping_cost_cents = $5,
                discount_cents = $6, total_cents = $7, shipping_address = $8, phone = $9,
                cancellation_reason = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.state.as_str())
        .bind(order.subtotal.cents())
        .bind(order.taxes.cents())
        .bind(order.shipping_cost.cents())
        .bind(order.discount.cents())
        .bind(order.total.cents())
        .bind(&order.shipping_address)
        .bind(&order.phone)
        .bind(&order.cancellation_reason)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow("orders"));
        }
        Ok(())
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.fetch_order("WHERE o.id = $1", OrderKey::Id(id)).await
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.fetch_order("WHERE o.id = $1 FOR UPDATE OF o", OrderKey::Id(id))
            .await
    }

    async fn find_order_by_tracking_token(&mut self, token: &str) -> Result<Option<Order>> {
        self.fetch_order("WHERE o.tracking_token = $1", OrderKey::Token(token))
            .await
    }

    async fn list_orders(&mut self, query: &OrderQuery) -> Result<OrderPage> {
        let mut count_sql = String::from(
            "SELECT COUNT(*) FROM orders o JOIN customers cu ON cu.id = o.customer_id",
        );
        order_filter_sql(&mut count_sql, query);
        let count_row = bind_order_filters(sqlx::query(&count_sql), query)
            .fetch_one(&mut *self.tx)
            .await?;
        let total: i64 = count_row.try_get(0)?;

        let mut sql = String::from(ORDER_SELECT);
        order_filter_sql(&mut sql, query);
        sql.push_str(&format!(
            " ORDER BY o.created_at DESC, o.order_number DESC LIMIT {} OFFSET {}",
            query.limit(),
            query.offset()
        ));
        let rows = bind_order_filters(sqlx::query(&sql), query)
            .fetch_all(&mut *self.tx)
            .await?;

        let mut orders = rows.iter().map(row_to_order).collect::<Result<Vec<_>>>()?;
        self.load_order_lines(&mut orders).await?;

        Ok(OrderPage {
            orders,
            total: total.max(0) as u64,
            page: query.page.max(1),
            page_size: query.limit(),
        })
    }

    async fn order_counts_by_state(&mut self) -> Result<HashMap<OrderState, u64>> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM orders GROUP BY state")
            .fetch_all(&mut *self.tx)
            .await?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in &rows {
            let state: String = row.try_get("state")?;
            let state = state
                .parse::<OrderState>()
                .map_err(|e| StoreError::InvalidValue(e.to_string()))?;
            let n: i64 = row.try_get("n")?;
            counts.insert(state, n.max(0) as u64);
        }
        Ok(counts)
    }

    async fn count_orders_since(&mut self, since: DateTime<Utc>) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE created_at >= $1")
            .bind(since)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn revenue_since(
        &mut self,
        since: DateTime<Utc>,
        states: &[OrderState],
    ) -> Result<Money> {
        let states: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(total_cents), 0)::BIGINT
            FROM orders
            WHERE created_at >= $1 AND state = ANY($2)
            "#,
        )
        .bind(since)
        .bind(states)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(Money::from_cents(cents))
    }
}

#[async_trait]
impl CustomerRepository for PostgresTransaction {
    async fn insert_customer(&mut self, customer: &Customer) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO customers ({CUSTOMER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(customer.id.as_uuid())
        .bind(&customer.email)
        .bind(&customer.password_hash)
        .bind(&customer.name)
        .bind(&customer.surname)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(&customer.city)
        .bind(&customer.postal_code)
        .bind(customer.is_staff)
        .bind(customer.is_active)
        .bind(customer.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_customer).transpose()
    }

    async fn find_customer_by_email(&mut self, email: &str) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_customer).transpose()
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("kib"), "%kib%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn filter_sql_numbers_parameters_in_bind_order() {
        let query = OrderQuery::new()
            .state(OrderState::Shipped)
            .email("ana");
        let mut sql = String::new();
        order_filter_sql(&mut sql, &query);
        assert_eq!(sql, " WHERE 1=1 AND o.state = $1 AND cu.email ILIKE $2");
    }

    #[test]
    fn negative_quantities_are_rejected_on_read() {
        assert!(to_u32(-1, "stock").is_err());
        assert_eq!(to_u32(7, "stock").unwrap(), 7);
    }
}
