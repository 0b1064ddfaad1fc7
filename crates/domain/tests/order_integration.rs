//! Integration tests for order placement, status transitions and payment
//! reconciliation against the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{
    Actor, Money, NewProduct, NewVariant, OrderStatus, PaymentMethod, Product, UserId, Variant,
};
use domain::{
    CartLine, CreateOrder, InMemoryEventPublisher, OrderAction, OrderError, OrderEvent,
    OrderService, PaymentReconciler, ReconcilerConfig, ReconciliationOutcome,
};
use rust_decimal::Decimal;
use store::{CatalogStore, FulfillmentStore, InMemoryStore};

type Service = OrderService<InMemoryStore, InMemoryEventPublisher>;

struct Shop {
    store: InMemoryStore,
    publisher: InMemoryEventPublisher,
    service: Arc<Service>,
}

impl Shop {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let publisher = InMemoryEventPublisher::new();
        let service = Arc::new(OrderService::new(store.clone(), publisher.clone()));
        Self {
            store,
            publisher,
            service,
        }
    }

    async fn product(&self, product: NewProduct) -> Product {
        self.store.insert_product(product).await.unwrap()
    }

    async fn variant(&self, product: &Product, size: &str, stock: u32) -> Variant {
        self.store
            .insert_variant(NewVariant::new(
                product.id,
                size,
                stock,
                format!("{}-{size}", product.name.to_uppercase()),
            ))
            .await
            .unwrap()
    }

    async fn stock(&self, variant: &Variant) -> u32 {
        self.store
            .get_variant(variant.id)
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    fn reconciler(&self) -> PaymentReconciler<InMemoryStore, InMemoryEventPublisher> {
        PaymentReconciler::new(
            self.store.clone(),
            self.publisher.clone(),
            ReconcilerConfig::default(),
        )
        .unwrap()
    }
}

fn order_for(
    user: i64,
    method: PaymentMethod,
    declared: Money,
    lines: Vec<CartLine>,
) -> CreateOrder {
    CreateOrder {
        user_id: UserId::new(user),
        customer_name: "Nguyen Van An".to_string(),
        customer_phone: "0901234567".to_string(),
        shipping_address: "12 Hang Bai, Ha Noi".to_string(),
        payment_method: method,
        note: Some("Call before delivery".to_string()),
        declared_total: declared,
        lines,
    }
}

mod placement {
    use super::*;

    #[tokio::test]
    async fn two_shirts_with_shipping() {
        let shop = Shop::new();
        let shirt = shop
            .product(NewProduct::new("Tee", Money::from_major(50_000)))
            .await;
        let medium = shop.variant(&shirt, "M", 10).await;

        let order = shop
            .service
            .create_order(order_for(
                1,
                PaymentMethod::Cod,
                Money::from_major(130_000),
                vec![CartLine::new(shirt.id, medium.id, 2)],
            ))
            .await
            .unwrap();

        assert_eq!(order.total_amount, Money::from_major(130_000));
        assert_eq!(order.shipping_fee, Money::from_major(30_000));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].price_at_purchase, Money::from_major(50_000));
        assert_eq!(shop.stock(&medium).await, 8);

        let stored = shop.service.get_order(order.id).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn surcharge_and_promotion_are_captured_at_purchase() {
        let shop = Shop::new();
        let now = Utc::now();
        let jacket = shop
            .product(
                NewProduct::new("Jacket", Money::from_major(100))
                    .with_size_rule("L", Decimal::from(10))
                    .with_promotion(
                        "Autumn",
                        Decimal::from(20),
                        now - Duration::days(1),
                        now + Duration::days(1),
                    ),
            )
            .await;
        let xl = shop.variant(&jacket, "XL", 3).await;
        let small = shop.variant(&jacket, "S", 3).await;

        // XL: 100 * 1.1 * 0.8 = 88, S: 100 * 0.8 = 80, plus 30000 shipping.
        let order = shop
            .service
            .create_order(order_for(
                2,
                PaymentMethod::BankTransfer,
                Money::from_major(30_168),
                vec![
                    CartLine::new(jacket.id, xl.id, 1),
                    CartLine::new(jacket.id, small.id, 1),
                ],
            ))
            .await
            .unwrap();

        let prices: Vec<_> = order
            .items
            .iter()
            .map(|item| (item.variant_id, item.price_at_purchase))
            .collect();
        assert!(prices.contains(&(xl.id, Money::from_major(88))));
        assert!(prices.contains(&(small.id, Money::from_major(80))));
    }

    #[tokio::test]
    async fn shortage_on_one_line_rolls_back_the_whole_order() {
        let shop = Shop::new();
        let shirt = shop
            .product(NewProduct::new("Tee", Money::from_major(50_000)))
            .await;
        let plenty = shop.variant(&shirt, "M", 10).await;
        let scarce = shop.variant(&shirt, "L", 1).await;

        let result = shop
            .service
            .create_order(order_for(
                1,
                PaymentMethod::Cod,
                Money::from_major(230_000),
                vec![
                    CartLine::new(shirt.id, plenty.id, 2),
                    CartLine::new(shirt.id, scarce.id, 2),
                ],
            ))
            .await;

        match result {
            Err(OrderError::InsufficientStock {
                variant_id,
                requested,
                available,
            }) => {
                assert_eq!(variant_id, scarce.id);
                assert_eq!(requested, 2);
                assert_eq!(available, 1);
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(shop.stock(&plenty).await, 10);
        assert_eq!(shop.stock(&scarce).await, 1);
        assert!(shop.service.list_orders(None).await.unwrap().is_empty());
        assert!(shop.publisher.events().is_empty());
    }

    #[tokio::test]
    async fn mismatched_total_is_rejected_before_reserving() {
        let shop = Shop::new();
        let shirt = shop
            .product(NewProduct::new("Tee", Money::from_major(50_000)))
            .await;
        let medium = shop.variant(&shirt, "M", 10).await;

        let result = shop
            .service
            .create_order(order_for(
                1,
                PaymentMethod::Cod,
                Money::from_major(100_000),
                vec![CartLine::new(shirt.id, medium.id, 2)],
            ))
            .await;

        assert!(matches!(result, Err(OrderError::TotalMismatch { .. })));
        assert_eq!(shop.stock(&medium).await, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_orders_never_oversell() {
        let shop = Shop::new();
        let shirt = shop
            .product(NewProduct::new("Tee", Money::from_major(50_000)))
            .await;
        let medium = shop.variant(&shirt, "M", 5).await;

        let attempts = (0..12).map(|user| {
            let service = Arc::clone(&shop.service);
            let cmd = order_for(
                user,
                PaymentMethod::Cod,
                Money::from_major(80_000),
                vec![CartLine::new(shirt.id, medium.id, 1)],
            );
            tokio::spawn(async move { service.create_order(cmd).await })
        });
        let results = futures_util::future::join_all(attempts).await;

        let mut placed = 0;
        let mut short = 0;
        for result in results {
            match result.unwrap() {
                Ok(_) => placed += 1,
                Err(OrderError::InsufficientStock { .. }) => short += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(placed, 5);
        assert_eq!(short, 7);
        assert_eq!(shop.stock(&medium).await, 0);
        assert_eq!(shop.service.list_orders(None).await.unwrap().len(), 5);
    }
}

mod lifecycle {
    use super::*;

    async fn placed_order(shop: &Shop, user: i64, method: PaymentMethod) -> common::Order {
        let shirt = shop
            .product(NewProduct::new("Tee", Money::from_major(50_000)))
            .await;
        let medium = shop.variant(&shirt, "M", 10).await;
        shop.service
            .create_order(order_for(
                user,
                method,
                Money::from_major(80_000),
                vec![CartLine::new(shirt.id, medium.id, 1)],
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn transfer_payment_through_delivery() {
        let shop = Shop::new();
        let order = placed_order(&shop, 4, PaymentMethod::BankTransfer).await;
        let admin = Actor::Admin(UserId::new(99));

        let outcome = shop
            .reconciler()
            .handle_notification(
                &format!("Thanh toan DONHANG{} cam on", order.id),
                Money::from_major(80_000),
                "FT24001",
            )
            .await;
        assert!(matches!(outcome, ReconciliationOutcome::Confirmed(_)));

        shop.service
            .transition_order(order.id, OrderAction::Ship, admin)
            .await
            .unwrap();
        let delivered = shop
            .service
            .confirm_delivery(order.id, UserId::new(4))
            .await
            .unwrap();

        assert_eq!(delivered.status, OrderStatus::Delivered);
        // Placement plus three transitions.
        assert_eq!(delivered.audit_log.len(), 4);
        assert_eq!(
            shop.publisher.event_types(),
            vec![
                "order.created",
                "order.status_changed",
                "order.shipped",
                "order.status_changed",
                "order.status_changed",
            ]
        );
    }

    #[tokio::test]
    async fn other_users_cannot_confirm_delivery() {
        let shop = Shop::new();
        let order = placed_order(&shop, 4, PaymentMethod::Cod).await;
        let admin = Actor::Admin(UserId::new(99));
        for action in [OrderAction::Process, OrderAction::Ship] {
            shop.service
                .transition_order(order.id, action, admin.clone())
                .await
                .unwrap();
        }

        let result = shop.service.confirm_delivery(order.id, UserId::new(5)).await;
        assert!(matches!(result, Err(OrderError::OrderNotFound(_))));
        let stored = shop.service.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn cancelled_orders_stay_cancelled() {
        let shop = Shop::new();
        let order = placed_order(&shop, 4, PaymentMethod::Cod).await;
        let admin = Actor::Admin(UserId::new(99));

        shop.service
            .transition_order(order.id, OrderAction::Cancel, admin.clone())
            .await
            .unwrap();

        for action in [OrderAction::Process, OrderAction::Cancel] {
            let result = shop
                .service
                .transition_order(order.id, action, admin.clone())
                .await;
            assert!(matches!(result, Err(OrderError::AlreadyCancelled(_))));
        }

        let outcome = shop
            .reconciler()
            .handle_notification(
                &format!("DONHANG{}", order.id),
                Money::from_major(80_000),
                "FT24002",
            )
            .await;
        assert_eq!(
            outcome,
            ReconciliationOutcome::AlreadyProcessed {
                order_id: order.id,
                status: OrderStatus::Cancelled,
            }
        );
    }

    #[tokio::test]
    async fn per_user_listing_filters_by_owner_and_status() {
        let shop = Shop::new();
        let first = placed_order(&shop, 4, PaymentMethod::Cod).await;
        let second = placed_order(&shop, 4, PaymentMethod::Cod).await;
        placed_order(&shop, 5, PaymentMethod::Cod).await;

        shop.service
            .transition_order(first.id, OrderAction::Process, Actor::System)
            .await
            .unwrap();

        let mine = shop
            .service
            .list_orders_for_user(UserId::new(4))
            .await
            .unwrap();
        let ids: Vec<_> = mine.iter().map(|order| order.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let pending = shop
            .service
            .list_orders_for_user_by_status(UserId::new(4), OrderStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
    }
}

mod payments {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn duplicate_deliveries_confirm_once() {
        let shop = Shop::new();
        let shirt = shop
            .product(NewProduct::new("Tee", Money::from_major(50_000)))
            .await;
        let medium = shop.variant(&shirt, "M", 10).await;
        let order = shop
            .service
            .create_order(order_for(
                8,
                PaymentMethod::BankTransfer,
                Money::from_major(80_000),
                vec![CartLine::new(shirt.id, medium.id, 1)],
            ))
            .await
            .unwrap();

        let reconciler = Arc::new(shop.reconciler());
        let description = format!("DONHANG{}", order.id);
        let deliveries = (0..8).map(|_| {
            let reconciler = Arc::clone(&reconciler);
            let description = description.clone();
            tokio::spawn(async move {
                reconciler
                    .handle_notification(&description, Money::from_major(80_000), "FT-DUP")
                    .await
            })
        });
        let outcomes = futures_util::future::join_all(deliveries).await;

        let confirmed = outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap())
            .filter(|outcome| matches!(outcome, ReconciliationOutcome::Confirmed(_)))
            .count();
        assert_eq!(confirmed, 1);

        let stored = shop.service.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);
        assert_eq!(
            shop.store.list_payment_notifications().await.unwrap().len(),
            8
        );

        let transitions = shop
            .publisher
            .events()
            .into_iter()
            .filter(|event| matches!(event, OrderEvent::StatusChanged { .. }))
            .count();
        assert_eq!(transitions, 1);
    }
}

mod races {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use common::{Order, OrderId, ProductId, VariantId};
    use domain::{MAX_TRANSITION_ATTEMPTS, NoopPublisher};
    use store::{PaymentNotificationRecord, StatusChange, StoreError};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancel_and_payment_never_both_win_from_pending() {
        let shop = Shop::new();
        let shirt = shop
            .product(NewProduct::new("Tee", Money::from_major(50_000)))
            .await;
        let medium = shop.variant(&shirt, "M", 100).await;
        let reconciler = Arc::new(shop.reconciler());
        let admin = Actor::Admin(UserId::new(1));

        for round in 0..20 {
            let order = shop
                .service
                .create_order(order_for(
                    9,
                    PaymentMethod::BankTransfer,
                    Money::from_major(80_000),
                    vec![CartLine::new(shirt.id, medium.id, 1)],
                ))
                .await
                .unwrap();

            let service = Arc::clone(&shop.service);
            let admin = admin.clone();
            let cancel = tokio::spawn(async move {
                service
                    .transition_order(order.id, OrderAction::Cancel, admin)
                    .await
            });
            let reconciler = Arc::clone(&reconciler);
            let description = format!("DONHANG{}", order.id);
            let transaction = format!("FT-RACE-{round}");
            let payment = tokio::spawn(async move {
                reconciler
                    .handle_notification(&description, Money::from_major(80_000), &transaction)
                    .await
            });

            let cancelled = cancel.await.unwrap().unwrap();
            let payment = payment.await.unwrap();
            assert_eq!(cancelled.status, OrderStatus::Cancelled);

            let stored = shop.service.get_order(order.id).await.unwrap();
            assert_eq!(stored.status, OrderStatus::Cancelled);

            // Placement, then one entry per committed transition.
            let statuses: Vec<_> = stored.audit_log[1..]
                .iter()
                .map(|entry| entry.message.clone())
                .collect();
            match payment {
                ReconciliationOutcome::Confirmed(_) => assert_eq!(
                    statuses,
                    vec![
                        format!("Payment confirmed, transaction FT-RACE-{round}, amount 80000"),
                        "Status changed from PROCESSING to CANCELLED".to_string(),
                    ]
                ),
                ReconciliationOutcome::AlreadyProcessed { status, .. } => {
                    assert_eq!(status, OrderStatus::Cancelled);
                    assert_eq!(
                        statuses,
                        vec!["Status changed from PENDING to CANCELLED".to_string()]
                    );
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    /// Store whose status compare-and-set always loses.
    #[derive(Clone)]
    struct ContendedStore {
        inner: InMemoryStore,
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CatalogStore for ContendedStore {
        async fn insert_product(&self, product: NewProduct) -> store::Result<Product> {
            self.inner.insert_product(product).await
        }

        async fn insert_variant(&self, variant: NewVariant) -> store::Result<Variant> {
            self.inner.insert_variant(variant).await
        }

        async fn get_product(&self, product_id: ProductId) -> store::Result<Option<Product>> {
            self.inner.get_product(product_id).await
        }

        async fn get_variant(&self, variant_id: VariantId) -> store::Result<Option<Variant>> {
            self.inner.get_variant(variant_id).await
        }

        async fn restock(&self, variant_id: VariantId, quantity: u32) -> store::Result<Variant> {
            self.inner.restock(variant_id, quantity).await
        }
    }

    #[async_trait]
    impl FulfillmentStore for ContendedStore {
        type Transaction = store::InMemoryTransaction;

        async fn begin(&self) -> store::Result<Self::Transaction> {
            self.inner.begin().await
        }

        async fn get_order(&self, order_id: OrderId) -> store::Result<Option<Order>> {
            self.inner.get_order(order_id).await
        }

        async fn list_orders(&self, status: Option<OrderStatus>) -> store::Result<Vec<Order>> {
            self.inner.list_orders(status).await
        }

        async fn list_orders_for_user(
            &self,
            user_id: UserId,
            status: Option<OrderStatus>,
        ) -> store::Result<Vec<Order>> {
            self.inner.list_orders_for_user(user_id, status).await
        }

        async fn compare_and_set_status(&self, change: StatusChange) -> store::Result<Order> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::StatusConflict {
                order_id: change.order_id,
                expected: change.expected,
                actual: change.expected,
            })
        }

        async fn record_payment_notification(
            &self,
            record: PaymentNotificationRecord,
        ) -> store::Result<()> {
            self.inner.record_payment_notification(record).await
        }

        async fn list_payment_notifications(
            &self,
        ) -> store::Result<Vec<PaymentNotificationRecord>> {
            self.inner.list_payment_notifications().await
        }

        fn backend(&self) -> &'static str {
            "contended"
        }
    }

    #[tokio::test]
    async fn persistent_conflicts_give_up_after_retries() {
        let store = ContendedStore {
            inner: InMemoryStore::new(),
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        let product = store
            .insert_product(NewProduct::new("Tee", Money::from_major(50_000)))
            .await
            .unwrap();
        let variant = store
            .insert_variant(NewVariant::new(product.id, "M", 5, "TEE-M"))
            .await
            .unwrap();
        let service = OrderService::new(store.clone(), NoopPublisher);
        let order = service
            .create_order(order_for(
                4,
                PaymentMethod::Cod,
                Money::from_major(80_000),
                vec![CartLine::new(product.id, variant.id, 1)],
            ))
            .await
            .unwrap();

        let result = service
            .transition_order(order.id, OrderAction::Process, Actor::System)
            .await;

        assert!(matches!(
            result,
            Err(OrderError::ConcurrentModification(id)) if id == order.id
        ));
        assert_eq!(
            store.attempts.load(Ordering::SeqCst),
            MAX_TRANSITION_ATTEMPTS
        );
        assert_eq!(MAX_TRANSITION_ATTEMPTS, 3);

        let stored = service.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.audit_log.len(), 1);
    }
}
