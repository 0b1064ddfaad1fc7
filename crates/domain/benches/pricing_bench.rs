use chrono::{Duration, Utc};
use common::{Money, NewProduct, NewVariant, PaymentMethod, Product, ProductId, UserId};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use domain::{CartLine, CreateOrder, NoopPublisher, OrderService, pricing};
use rust_decimal::Decimal;
use store::{CatalogStore, InMemoryStore};

fn promoted_product() -> Product {
    let now = Utc::now();
    Product {
        id: ProductId::new(1),
        name: "Jacket".to_string(),
        base_price: Money::from_major(100_000),
        size_threshold: Some("XL".to_string()),
        size_surcharge_pct: Some(Decimal::from(10)),
        discount_pct: Some(Decimal::from(15)),
        promo_start: Some(now - Duration::days(1)),
        promo_end: Some(now + Duration::days(1)),
        promo_name: Some("Winter".to_string()),
    }
}

fn bench_price(c: &mut Criterion) {
    let product = promoted_product();
    let now = Utc::now();

    c.bench_function("pricing/plain_size", |b| {
        b.iter(|| pricing::price(black_box(&product), black_box("M"), now));
    });

    c.bench_function("pricing/surcharge_and_discount", |b| {
        b.iter(|| pricing::price(black_box(&product), black_box("3XL"), now));
    });

    c.bench_function("pricing/numeric_size", |b| {
        b.iter(|| pricing::price(black_box(&product), black_box("42"), now));
    });
}

fn bench_create_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let (product, variant) = rt.block_on(async {
        let product = store
            .insert_product(NewProduct::new("Tee", Money::from_major(50_000)))
            .await
            .unwrap();
        let variant = store
            .insert_variant(NewVariant::new(product.id, "M", u32::MAX, "TEE-M"))
            .await
            .unwrap();
        (product, variant)
    });
    let service = OrderService::new(store, NoopPublisher);

    c.bench_function("domain/create_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let cmd = CreateOrder {
                    user_id: UserId::new(1),
                    customer_name: "Bench".to_string(),
                    customer_phone: "0900000000".to_string(),
                    shipping_address: "1 Bench Street".to_string(),
                    payment_method: PaymentMethod::Cod,
                    note: None,
                    declared_total: Money::from_major(80_000),
                    lines: vec![CartLine::new(product.id, variant.id, 1)],
                };
                service.create_order(cmd).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_price, bench_create_order);
criterion_main!(benches);
