use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CartId, CartService, CatalogService, Money};
use store::{InMemoryStore, NewProduct, Product, Species};

fn seed(rt: &tokio::runtime::Runtime, store: &InMemoryStore, stock: u32) -> Product {
    let catalog = CatalogService::new(store.clone());
    rt.block_on(async {
        let brand = catalog.create_brand("Bench").await.unwrap();
        let category = catalog.create_category("Bench", "").await.unwrap();
        catalog
            .create_product(NewProduct {
                name: "Benchmark Ball".to_string(),
                description: String::new(),
                brand_id: brand.id,
                category_id: category.id,
                species: Species::Both,
                color: String::new(),
                material: String::new(),
                price: Money::from_cents(1000),
                sale_price: None,
                stock,
                available: true,
                featured: false,
            })
            .await
            .unwrap()
    })
}

fn bench_add_item(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let product = seed(&rt, &store, u32::MAX);
    let service = CartService::new(store);
    let cart_id = rt.block_on(async { service.get_or_create(None, None).await.unwrap().id });

    c.bench_function("cart/add_item", |b| {
        b.iter(|| {
            rt.block_on(async {
                service.add_item(cart_id, product.id, 1).await.unwrap();
            });
        });
    });
}

fn bench_get_detail(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let product = seed(&rt, &store, 100);
    let service = CartService::new(store);
    let cart_id = rt.block_on(async {
        let cart_id = service.get_or_create(None, None).await.unwrap().id;
        service.add_item(cart_id, product.id, 5).await.unwrap();
        cart_id
    });

    c.bench_function("cart/get_detail", |b| {
        b.iter(|| {
            rt.block_on(async {
                service.get_detail(cart_id).await.unwrap();
            });
        });
    });
}

fn bench_add_then_clear(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let product = seed(&rt, &store, 100);
    let service = CartService::new(store);

    c.bench_function("cart/create_add_clear", |b| {
        b.iter(|| {
            rt.block_on(async {
                let cart_id: CartId = service.get_or_create(None, None).await.unwrap().id;
                service.add_item(cart_id, product.id, 2).await.unwrap();
                service.clear(cart_id).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_add_item, bench_get_detail, bench_add_then_clear);
criterion_main!(benches);
