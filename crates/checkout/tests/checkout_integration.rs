//! Integration tests for checkout, including failure injection mid-way.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use checkout::{CHECKOUTS, CheckoutCoordinator, CheckoutError, CheckoutRecord, CheckoutState, CompletedStep};
use common::{GuestToken, PromoCode, Sku, VariantId};
use domain::{
    CartService, CatalogService, Discount, DomainError, Money, NewProduct, NewPromo, OrderService,
    OrderStatus, Product, PromoRejection, PromotionService, ShippingAddress, Variant,
};
use store::{
    Bounds, Document, DocumentQuery, DocumentStore, DocumentStoreExt, InMemoryDocumentStore,
    SaveOptions, StoreError,
};

/// Which `adjust` calls should fail.
#[derive(Debug, Clone)]
struct Fault {
    key: String,
    /// Negative deltas are reservations and consumption; positive ones are undos.
    on_increase: bool,
}

/// Checkout record saves to let through, then how many to fail.
#[derive(Debug, Clone, Copy, Default)]
struct RecordFault {
    allow: usize,
    fail: usize,
}

/// Wraps the in-memory store and fails chosen counter adjustments
/// and checkout record saves.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: InMemoryDocumentStore,
    faults: Arc<Mutex<Vec<Fault>>>,
    record_fault: Arc<Mutex<RecordFault>>,
}

impl FlakyStore {
    fn fail_reserve_on(&self, key: impl Into<String>) {
        self.faults.lock().unwrap().push(Fault {
            key: key.into(),
            on_increase: false,
        });
    }

    fn fail_release_on(&self, key: impl Into<String>) {
        self.faults.lock().unwrap().push(Fault {
            key: key.into(),
            on_increase: true,
        });
    }

    fn fail_record_saves(&self, allow: usize, fail: usize) {
        *self.record_fault.lock().unwrap() = RecordFault { allow, fail };
    }

    fn should_fail_record_save(&self) -> bool {
        let mut fault = self.record_fault.lock().unwrap();
        if fault.allow > 0 {
            fault.allow -= 1;
            false
        } else if fault.fail > 0 {
            fault.fail -= 1;
            true
        } else {
            false
        }
    }

    fn should_fail(&self, key: &str, delta: i64) -> bool {
        self.faults
            .lock()
            .unwrap()
            .iter()
            .any(|f| f.key == key && f.on_increase == (delta > 0))
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn load(&self, collection: &str, key: &str) -> store::Result<Option<Document>> {
        self.inner.load(collection, key).await
    }

    async fn save(&self, document: Document, options: SaveOptions) -> store::Result<Document> {
        if document.collection == CHECKOUTS && self.should_fail_record_save() {
            return Err(StoreError::NotFound {
                collection: document.collection,
                key: document.key,
            });
        }
        self.inner.save(document, options).await
    }

    async fn delete(&self, collection: &str, key: &str) -> store::Result<bool> {
        self.inner.delete(collection, key).await
    }

    async fn query(&self, query: DocumentQuery) -> store::Result<Vec<Document>> {
        self.inner.query(query).await
    }

    async fn count(&self, query: DocumentQuery) -> store::Result<u64> {
        self.inner.count(query).await
    }

    async fn adjust(
        &self,
        collection: &str,
        key: &str,
        path: &str,
        delta: i64,
        bounds: Bounds,
    ) -> store::Result<i64> {
        if self.should_fail(key, delta) {
            return Err(StoreError::InvalidPath {
                collection: collection.to_string(),
                key: key.to_string(),
                path: path.to_string(),
            });
        }
        self.inner.adjust(collection, key, path, delta, bounds).await
    }
}

struct Harness {
    store: FlakyStore,
    coordinator: CheckoutCoordinator<FlakyStore>,
    carts: CartService<FlakyStore>,
    catalog: CatalogService<FlakyStore>,
    promotions: PromotionService<FlakyStore>,
    orders: OrderService<FlakyStore>,
}

impl Harness {
    fn new() -> Self {
        let store = FlakyStore::default();
        let carts = CartService::new(store.clone(), Duration::hours(2));
        Self {
            coordinator: CheckoutCoordinator::new(store.clone(), carts.clone()),
            carts,
            catalog: CatalogService::new(store.clone()),
            promotions: PromotionService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            store,
        }
    }

    async fn product(&self, sku: &str, cents: i64, inventory: u32) -> Product {
        self.catalog
            .create_product(NewProduct {
                name: format!("Product {sku}"),
                description: "Integration test product".to_string(),
                category: "Electronics".to_string(),
                base_price: Money::from_cents(cents),
                variants: vec![Variant {
                    id: VariantId::new("default"),
                    name: "Default".to_string(),
                    price: Money::from_cents(cents),
                    sku: Sku::new(sku),
                    inventory,
                    attributes: BTreeMap::new(),
                }],
                images: vec![],
            })
            .await
            .unwrap()
    }

    async fn promo(&self, code: &str, percent_bp: u32, usage_limit: Option<u32>) {
        let now = Utc::now();
        self.promotions
            .create_promo(NewPromo {
                code: code.to_string(),
                name: format!("{code} promo"),
                discount: Discount::Percentage {
                    basis_points: percent_bp,
                    max_discount: None,
                },
                minimum_order_amount: None,
                valid_from: now - Duration::days(1),
                valid_until: now + Duration::days(1),
                usage_limit,
                is_active: true,
            })
            .await
            .unwrap();
    }

    async fn add(&self, token: GuestToken, product: &Product, quantity: u32) {
        self.carts
            .add_item(token, product.id, VariantId::new("default"), quantity)
            .await
            .unwrap();
    }

    async fn stock(&self, product: &Product) -> u32 {
        self.catalog.find_product(product.id).await.unwrap().variants[0].inventory
    }

    async fn used_count(&self, code: &str) -> u32 {
        self.promotions
            .find_promo(&PromoCode::new(code))
            .await
            .unwrap()
            .unwrap()
            .used_count
    }

    async fn records(&self) -> Vec<CheckoutRecord> {
        self.store
            .query_as(DocumentQuery::collection(CHECKOUTS))
            .await
            .unwrap()
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: "+44 20 7946 0958".to_string(),
        address: "12 St James's Square".to_string(),
        city: "London".to_string(),
        state: "London".to_string(),
        zip_code: "SW1Y 4JH".to_string(),
        country: "GB".to_string(),
    }
}

#[tokio::test]
async fn test_happy_path_with_promo() {
    let h = Harness::new();
    let laptop = h.product("LAP-1", 50_000, 4).await;
    let mouse = h.product("MOU-1", 2_500, 10).await;
    h.promo("WELCOME10", 1000, Some(100)).await;

    let token = GuestToken::generate();
    h.add(token, &laptop, 1).await;
    h.add(token, &mouse, 2).await;
    h.carts
        .apply_promo(token, &PromoCode::new("welcome10"))
        .await
        .unwrap();

    let order = h.coordinator.create_order(token, address()).await.unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.subtotal, Money::from_cents(55_000));
    assert_eq!(order.discount_amount, Money::from_cents(5_500));
    assert_eq!(order.total_amount, Money::from_cents(49_500));

    assert_eq!(h.stock(&laptop).await, 3);
    assert_eq!(h.stock(&mouse).await, 8);
    assert_eq!(h.used_count("WELCOME10").await, 1);
    assert!(h.carts.find(token).await.unwrap().is_none());

    let records = h.records().await;
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.state, CheckoutState::Completed);
    assert_eq!(record.order_number.as_ref(), Some(&order.order_number));
    let steps: Vec<_> = record.completed_steps.iter().map(|s| s.name()).collect();
    assert_eq!(
        steps,
        vec![
            "consume_promo",
            "create_order",
            "reserve_inventory",
            "reserve_inventory",
            "delete_cart"
        ]
    );

    let fetched = h
        .coordinator
        .get_checkout(record.checkout_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&fetched, record);
}

#[tokio::test]
async fn test_insufficient_inventory_changes_nothing() {
    let h = Harness::new();
    let widget = h.product("WID-1", 1_000, 5).await;
    let token = GuestToken::generate();
    h.add(token, &widget, 5).await;

    // Someone else buys two units before this guest checks out.
    h.catalog
        .reserve(widget.id, &VariantId::new("default"), 2)
        .await
        .unwrap();

    let result = h.coordinator.create_order(token, address()).await;

    match result {
        Err(CheckoutError::Domain(DomainError::InsufficientInventory {
            requested,
            available,
            product_name,
            ..
        })) => {
            assert_eq!(requested, 5);
            assert_eq!(available, 3);
            assert_eq!(product_name, "Product WID-1");
        }
        other => panic!("expected InsufficientInventory, got {other:?}"),
    }
    assert_eq!(h.stock(&widget).await, 3);
    assert!(h.orders.list_by_guest_token(token).await.unwrap().is_empty());
    assert_eq!(h.carts.get(token).await.unwrap().items[0].quantity, 5);
    assert!(h.records().await.is_empty());
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let h = Harness::new();
    let cart = h.carts.create().await.unwrap();

    let result = h.coordinator.create_order(cart.guest_token, address()).await;
    assert!(matches!(
        result,
        Err(CheckoutError::Domain(DomainError::EmptyCart))
    ));
}

#[tokio::test]
async fn test_invalid_address_lists_problems() {
    let h = Harness::new();
    let widget = h.product("WID-2", 1_000, 5).await;
    let token = GuestToken::generate();
    h.add(token, &widget, 1).await;

    let mut bad = address();
    bad.city = "   ".to_string();
    bad.phone = "123".to_string();

    match h.coordinator.create_order(token, bad).await {
        Err(CheckoutError::Domain(DomainError::ValidationFailed(problems))) => {
            assert_eq!(problems.len(), 2);
        }
        other => panic!("expected ValidationFailed, got {other:?}"),
    }
    assert_eq!(h.stock(&widget).await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_use_promo_is_won_by_exactly_one_checkout() {
    let h = Harness::new();
    let gadget = h.product("GAD-1", 10_000, 10).await;
    h.promo("ONCE", 2000, Some(1)).await;

    let first = GuestToken::generate();
    let second = GuestToken::generate();
    for token in [first, second] {
        h.add(token, &gadget, 1).await;
        h.carts
            .apply_promo(token, &PromoCode::new("ONCE"))
            .await
            .unwrap();
    }

    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|token| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.create_order(token, address()).await })
        })
        .collect();

    let mut won = 0;
    let mut limit_exceeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(CheckoutError::Domain(DomainError::PromoRejected {
                reason: PromoRejection::LimitExceeded,
                ..
            })) => limit_exceeded += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(won, 1);
    assert_eq!(limit_exceeded, 1);
    assert_eq!(h.used_count("ONCE").await, 1);
    assert_eq!(h.stock(&gadget).await, 9);
}

#[tokio::test]
async fn test_reservation_failure_is_compensated() {
    let h = Harness::new();
    let keyboard = h.product("KEY-1", 7_500, 6).await;
    let monitor = h.product("MON-1", 30_000, 2).await;
    h.promo("SAVE20", 2000, None).await;

    let token = GuestToken::generate();
    h.add(token, &keyboard, 2).await;
    h.add(token, &monitor, 1).await;
    h.carts
        .apply_promo(token, &PromoCode::new("SAVE20"))
        .await
        .unwrap();

    h.store.fail_reserve_on(monitor.id.to_string());

    let result = h.coordinator.create_order(token, address()).await;
    assert!(matches!(
        result,
        Err(CheckoutError::Domain(DomainError::Store(_)))
    ));

    assert_eq!(h.stock(&keyboard).await, 6);
    assert_eq!(h.stock(&monitor).await, 2);
    assert_eq!(h.used_count("SAVE20").await, 0);

    let cart = h.carts.get(token).await.unwrap();
    assert_eq!(cart.items.len(), 2);
    assert!(cart.applied_promo.is_some());

    let orders = h.orders.list_by_guest_token(token).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Cancelled);

    let records = h.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, CheckoutState::Failed);
    assert!(records[0].failure_reason.is_some());
    assert!(records[0].unreverted_steps.is_empty());
}

#[tokio::test]
async fn test_failed_undo_is_reported_and_recorded() {
    let h = Harness::new();
    let keyboard = h.product("KEY-2", 7_500, 6).await;
    let monitor = h.product("MON-2", 30_000, 2).await;

    let token = GuestToken::generate();
    h.add(token, &keyboard, 2).await;
    h.add(token, &monitor, 1).await;

    h.store.fail_reserve_on(monitor.id.to_string());
    h.store.fail_release_on(keyboard.id.to_string());

    let result = h.coordinator.create_order(token, address()).await;
    match result {
        Err(CheckoutError::CompensationFailed { reason, .. }) => {
            assert!(reason.contains("reserve_inventory"));
        }
        other => panic!("expected CompensationFailed, got {other:?}"),
    }

    // The keyboard units stay taken and are named on the record.
    assert_eq!(h.stock(&keyboard).await, 4);
    let record = &h.records().await[0];
    assert_eq!(record.state, CheckoutState::Failed);
    assert!(matches!(
        record.unreverted_steps.as_slice(),
        [CompletedStep::InventoryReserved { quantity: 2, .. }]
    ));
}

#[tokio::test]
async fn test_failed_record_write_after_promo_use_is_compensated() {
    let h = Harness::new();
    let desk = h.product("DSK-1", 25_000, 4).await;
    h.promo("ONCE10", 1000, Some(1)).await;

    let token = GuestToken::generate();
    h.add(token, &desk, 1).await;
    h.carts
        .apply_promo(token, &PromoCode::new("ONCE10"))
        .await
        .unwrap();

    // The start record is written; recording the consumed promo fails.
    h.store.fail_record_saves(1, 1);

    let result = h.coordinator.create_order(token, address()).await;
    assert!(matches!(
        result,
        Err(CheckoutError::Domain(DomainError::Store(_)))
    ));

    assert_eq!(h.used_count("ONCE10").await, 0);
    assert_eq!(h.stock(&desk).await, 4);
    assert!(h.orders.list_by_guest_token(token).await.unwrap().is_empty());

    let record = &h.records().await[0];
    assert_eq!(record.state, CheckoutState::Failed);
    assert!(matches!(
        record.completed_steps.as_slice(),
        [CompletedStep::PromoConsumed { .. }]
    ));
    assert!(record.unreverted_steps.is_empty());

    // The single-use code is still available for the retry.
    let order = h.coordinator.create_order(token, address()).await.unwrap();
    assert_eq!(order.discount_amount, Money::from_cents(2_500));
    assert_eq!(h.used_count("ONCE10").await, 1);
    assert_eq!(h.stock(&desk).await, 3);
}

#[tokio::test]
async fn test_undos_run_when_record_store_is_down() {
    let h = Harness::new();
    let chair = h.product("CHR-1", 12_000, 5).await;
    h.promo("ONCE15", 1500, Some(1)).await;

    let token = GuestToken::generate();
    h.add(token, &chair, 2).await;
    h.carts
        .apply_promo(token, &PromoCode::new("ONCE15"))
        .await
        .unwrap();

    // Every record write after the first fails, including those made
    // while compensating.
    h.store.fail_record_saves(1, usize::MAX);

    let result = h.coordinator.create_order(token, address()).await;
    assert!(result.is_err());

    assert_eq!(h.used_count("ONCE15").await, 0);
    assert_eq!(h.stock(&chair).await, 5);
    assert!(h.orders.list_by_guest_token(token).await.unwrap().is_empty());
    let cart = h.carts.get(token).await.unwrap();
    assert_eq!(cart.items[0].quantity, 2);
}

#[tokio::test]
async fn test_retry_after_partial_cleanup_returns_existing_order() {
    let h = Harness::new();
    let lamp = h.product("LMP-1", 4_000, 3).await;
    let token = GuestToken::generate();
    h.add(token, &lamp, 1).await;
    let cart = h.carts.get(token).await.unwrap();

    let order = h.coordinator.create_order(token, address()).await.unwrap();

    // Put the converted cart back as if its deletion had never happened.
    h.store
        .save_as(
            domain::CARTS,
            &token.to_string(),
            &cart,
            Some(cart.expires_at),
            SaveOptions::new(),
        )
        .await
        .unwrap();

    let retried = h.coordinator.create_order(token, address()).await.unwrap();

    assert_eq!(retried.order_number, order.order_number);
    assert_eq!(h.stock(&lamp).await, 2);
    assert_eq!(h.orders.list_by_guest_token(token).await.unwrap().len(), 1);
    assert!(h.carts.find(token).await.unwrap().is_none());
}

#[tokio::test]
async fn test_discount_is_not_refreshed_after_cart_changes() {
    let h = Harness::new();
    let chair = h.product("CHR-1", 10_000, 10).await;
    let desk = h.product("DSK-1", 5_000, 10).await;
    h.promo("TENOFF", 1000, None).await;

    let token = GuestToken::generate();
    h.add(token, &chair, 1).await;
    h.carts
        .apply_promo(token, &PromoCode::new("TENOFF"))
        .await
        .unwrap();
    h.add(token, &desk, 1).await;

    let order = h.coordinator.create_order(token, address()).await.unwrap();

    assert_eq!(order.subtotal, Money::from_cents(15_000));
    assert_eq!(order.discount_amount, Money::from_cents(1_000));
    assert_eq!(order.total_amount, Money::from_cents(14_000));
}
