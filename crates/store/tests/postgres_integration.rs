//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency and need a
//! running Docker daemon. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    Brand, Cart, CartLine, CartRepository, CatalogRepository, Category, Customer, CustomerId,
    CustomerRepository, Money, NewProduct, Order, OrderId, OrderLine, OrderQuery, OrderRepository,
    OrderState, PostgresStore, Product, ProductQuery, Species, Store, Transaction, constraint,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_storefront_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_lines, orders, cart_lines, carts, customers, products, \
         categories, brands",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

async fn seed_product(store: &PostgresStore, name: &str, stock: u32) -> Product {
    let mut tx = store.begin().await.unwrap();
    let brand = Brand::new(format!("{name} Co"));
    let category = Category::new(format!("{name} things"), "");
    tx.insert_brand(&brand).await.unwrap();
    tx.insert_category(&category).await.unwrap();
    let product = tx
        .insert_product(
            NewProduct {
                name: name.to_string(),
                description: format!("Premium {name}"),
                brand_id: brand.id,
                category_id: category.id,
                species: Species::Cat,
                color: String::new(),
                material: String::new(),
                price: Money::from_cents(1200),
                sale_price: Some(Money::from_cents(900)),
                stock,
                available: true,
                featured: false,
            },
            Utc::now(),
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();
    product
}

async fn seed_customer(store: &PostgresStore, email: &str) -> Customer {
    let customer = Customer {
        id: CustomerId::new(),
        email: email.to_string(),
        password_hash: "hash".to_string(),
        name: "Ana".to_string(),
        surname: "Ruiz".to_string(),
        phone: String::new(),
        address: String::new(),
        city: String::new(),
        postal_code: String::new(),
        is_staff: false,
        is_active: true,
        created_at: Utc::now(),
    };
    let mut tx = store.begin().await.unwrap();
    tx.insert_customer(&customer).await.unwrap();
    tx.commit().await.unwrap();
    customer
}

fn order_for(customer: &Customer, product: &Product, quantity: u32, number: &str) -> Order {
    let now = Utc::now();
    let line = OrderLine::new(product.id, &product.name, quantity, product.current_price());
    Order {
        id: OrderId::new(),
        customer_id: customer.id,
        customer_email: customer.email.clone(),
        order_number: number.to_string(),
        tracking_token: format!("token-{number}"),
        state: OrderState::Pending,
        subtotal: line.total,
        taxes: Money::from_cents(100),
        shipping_cost: Money::from_cents(500),
        discount: Money::zero(),
        total: Money::zero(),
        shipping_address: "1 Main St".to_string(),
        phone: "600111222".to_string(),
        cancellation_reason: None,
        lines: vec![line],
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn product_round_trips_with_brand_and_category_names() {
    let store = get_test_store().await;
    let product = seed_product(&store, "Scratcher", 4).await;

    let mut tx = store.begin().await.unwrap();
    let loaded = tx.get_product(product.id).await.unwrap().unwrap();

    assert_eq!(loaded.brand_name, "Scratcher Co");
    assert_eq!(loaded.category_name, "Scratcher things");
    assert_eq!(loaded.current_price(), Money::from_cents(900));
    assert_eq!(loaded.stock, 4);
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn uncommitted_writes_are_rolled_back() {
    let store = get_test_store().await;
    let product = seed_product(&store, "Scratcher", 4).await;

    {
        let mut tx = store.begin().await.unwrap();
        let mut changed = tx.lock_product(product.id).await.unwrap().unwrap();
        changed.stock = 0;
        tx.update_product(&changed).await.unwrap();
    }

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.get_product(product.id).await.unwrap().unwrap().stock, 4);
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn duplicate_cart_line_hits_unique_constraint() {
    let store = get_test_store().await;
    let product = seed_product(&store, "Scratcher", 4).await;

    let mut tx = store.begin().await.unwrap();
    let cart = Cart::new(None, Utc::now());
    tx.insert_cart(&cart).await.unwrap();
    tx.insert_cart_line(&CartLine::new(cart.id, product.id, 1, Utc::now()))
        .await
        .unwrap();

    let err = tx
        .insert_cart_line(&CartLine::new(cart.id, product.id, 1, Utc::now()))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation(constraint::CART_LINE_UNIQUE));
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn duplicate_email_hits_unique_constraint() {
    let store = get_test_store().await;
    let first = seed_customer(&store, "ana@example.com").await;

    let mut tx = store.begin().await.unwrap();
    let mut second = first.clone();
    second.id = CustomerId::new();
    let err = tx.insert_customer(&second).await.unwrap_err();
    assert!(err.is_unique_violation(constraint::CUSTOMER_EMAIL));
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn cart_lines_cascade_with_cart() {
    let store = get_test_store().await;
    let product = seed_product(&store, "Scratcher", 4).await;

    let mut tx = store.begin().await.unwrap();
    let cart = Cart::new(None, Utc::now());
    tx.insert_cart(&cart).await.unwrap();
    tx.insert_cart_line(&CartLine::new(cart.id, product.id, 2, Utc::now()))
        .await
        .unwrap();
    assert!(tx.delete_cart(cart.id).await.unwrap());
    assert!(tx.cart_lines(cart.id).await.unwrap().is_empty());
    tx.commit().await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn order_persists_with_recomputed_total() {
    let store = get_test_store().await;
    let product = seed_product(&store, "Scratcher", 4).await;
    let customer = seed_customer(&store, "ana@example.com").await;

    let mut tx = store.begin().await.unwrap();
    let mut order = order_for(&customer, &product, 2, "ORD-1");
    tx.insert_order(&mut order).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let loaded = tx.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.subtotal, Money::from_cents(1800));
    assert_eq!(loaded.total, Money::from_cents(1800 + 100 + 500));
    assert_eq!(loaded.lines.len(), 1);
    assert_eq!(loaded.lines[0].unit_price, Money::from_cents(900));
    assert_eq!(loaded.customer_email, "ana@example.com");

    let by_token = tx
        .find_order_by_tracking_token("token-ORD-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_token.id, order.id);
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn ordered_product_and_customer_are_protected() {
    let store = get_test_store().await;
    let product = seed_product(&store, "Scratcher", 4).await;
    let customer = seed_customer(&store, "ana@example.com").await;

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&mut order_for(&customer, &product, 1, "ORD-1"))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx.delete_product(product.id).await.unwrap_err();
    assert!(err.is_foreign_key_violation(constraint::ORDER_LINE_PRODUCT));

    let mut tx = store.begin().await.unwrap();
    let err = tx.delete_customer(customer.id).await.unwrap_err();
    assert!(err.is_foreign_key_violation(constraint::ORDER_CUSTOMER));
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn list_orders_filters_and_pages() {
    let store = get_test_store().await;
    let product = seed_product(&store, "Scratcher", 10).await;
    let ana = seed_customer(&store, "ana@example.com").await;
    let bob = seed_customer(&store, "bob@example.com").await;

    let mut tx = store.begin().await.unwrap();
    for i in 0..3 {
        let mut order = order_for(&ana, &product, 1, &format!("ORD-A{i}"));
        order.created_at = Utc::now() - Duration::minutes(10 - i);
        tx.insert_order(&mut order).await.unwrap();
    }
    let mut shipped = order_for(&bob, &product, 1, "ORD-B0");
    shipped.state = OrderState::Shipped;
    tx.insert_order(&mut shipped).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let page = tx
        .list_orders(&OrderQuery::new().email("ANA@").page_size(2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.orders.len(), 2);
    assert_eq!(page.orders[0].order_number, "ORD-A2");

    let page = tx
        .list_orders(&OrderQuery::new().state(OrderState::Shipped))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.orders[0].order_number, "ORD-B0");

    let counts = tx.order_counts_by_state().await.unwrap();
    assert_eq!(counts.get(&OrderState::Pending), Some(&3));
    assert_eq!(counts.get(&OrderState::Shipped), Some(&1));

    let since = Utc::now() - Duration::days(30);
    let revenue = tx
        .revenue_since(since, &OrderState::REVENUE_RECOGNIZED)
        .await
        .unwrap();
    assert_eq!(revenue, shipped.total);
}

#[tokio::test]
#[ignore = "requires docker"]
#[serial]
async fn search_matches_brand_name_case_insensitively() {
    let store = get_test_store().await;
    seed_product(&store, "Scratcher", 4).await;
    seed_product(&store, "Kibble", 4).await;

    let mut tx = store.begin().await.unwrap();
    let found = tx
        .search_products(&ProductQuery::new().text("kibble co"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Kibble");

    let all = tx.search_products(&ProductQuery::new()).await.unwrap();
    let names: Vec<_> = all.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Kibble", "Scratcher"]);
}
