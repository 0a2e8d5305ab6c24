//! Cart service: the cart engine's operations over the document store.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use common::{GuestToken, ProductId, PromoCode, VariantId};
use store::{DocumentStore, DocumentStoreExt, SaveOptions, Version};
use tokio::sync::OwnedMutexGuard;

use super::view::{CartLineView, CartView, ProductSummary, PromoApplication, PromoQuote, final_total};
use super::{AppliedPromotion, Cart, KeyedLocks};
use crate::{CatalogService, DomainError, Product, PromotionService};

/// Collection holding cart documents, keyed by guest token.
pub const CARTS: &str = "carts";

/// Default cart lifetime: seven days from the last mutation.
pub const DEFAULT_CART_TTL_HOURS: i64 = 168;

/// Service for cart operations.
///
/// Mutations on the same guest token are serialized in-process, and every
/// save carries the version it was based on so that writers in other
/// processes are detected. A detected conflict is retried once on a fresh copy.
#[derive(Clone)]
pub struct CartService<S: DocumentStore> {
    store: S,
    catalog: CatalogService<S>,
    promotions: PromotionService<S>,
    ttl: Duration,
    locks: KeyedLocks<GuestToken>,
}

impl<S: DocumentStore + Clone> CartService<S> {
    /// Creates a cart service whose carts expire `ttl` after their last change.
    pub fn new(store: S, ttl: Duration) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            promotions: PromotionService::new(store.clone()),
            store,
            ttl,
            locks: KeyedLocks::new(),
        }
    }

    /// Waits for exclusive access to a guest token's cart.
    ///
    /// Every mutating cart operation takes this lock. Holders must not call
    /// them in turn.
    pub async fn lock(&self, guest_token: GuestToken) -> OwnedMutexGuard<()> {
        self.locks.lock(guest_token).await
    }

    /// Creates an empty cart under a freshly generated guest token.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self) -> Result<Cart, DomainError> {
        let guest_token = GuestToken::generate();
        let cart = Cart::new(guest_token, Utc::now(), self.ttl);
        self.save(&cart, Version::initial()).await?;

        metrics::counter!("cart_mutations_total", "op" => "create").increment(1);
        tracing::info!(%guest_token, "cart created");
        Ok(cart)
    }

    /// Loads a cart if one is live for the token.
    pub async fn find(&self, guest_token: GuestToken) -> Result<Option<Cart>, DomainError> {
        Ok(self
            .store
            .load_as::<Cart>(CARTS, &guest_token.to_string())
            .await?
            .map(|(cart, _)| cart))
    }

    /// Loads a cart, failing with `NotFound` if there is none.
    pub async fn get(&self, guest_token: GuestToken) -> Result<Cart, DomainError> {
        self.find(guest_token)
            .await?
            .ok_or_else(|| DomainError::not_found("Cart", guest_token))
    }

    /// Deletes a cart. Returns true if one was deleted.
    pub async fn delete(&self, guest_token: GuestToken) -> Result<bool, DomainError> {
        Ok(self.store.delete(CARTS, &guest_token.to_string()).await?)
    }

    /// Returns the cart enriched with live product data and fresh totals.
    #[tracing::instrument(skip(self))]
    pub async fn view(&self, guest_token: GuestToken) -> Result<CartView, DomainError> {
        let cart = self.get(guest_token).await?;

        let mut products: HashMap<ProductId, Option<Product>> = HashMap::new();
        let mut items = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            if !products.contains_key(&item.product_id) {
                let product = match self.catalog.find_product(item.product_id).await {
                    Ok(product) => Some(product),
                    Err(DomainError::NotFound { .. }) => None,
                    Err(e) => return Err(e),
                };
                products.insert(item.product_id, product);
            }
            let product = products.get(&item.product_id).and_then(Option::as_ref);

            items.push(CartLineView {
                product_id: item.product_id,
                variant_id: item.variant_id.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                item_total: item.line_total(),
                product: product.map(|p| ProductSummary {
                    id: p.id,
                    name: p.name.clone(),
                    images: p.images.clone(),
                }),
                variant: product.and_then(|p| p.variant(&item.variant_id)).cloned(),
            });
        }

        let total_amount = cart.subtotal();
        let discount_amount = cart.discount_amount();
        Ok(CartView {
            cart_id: cart.cart_id,
            guest_token: cart.guest_token,
            items,
            total_amount,
            applied_promo: cart.applied_promo,
            discount_amount,
            final_total: final_total(total_amount, discount_amount),
            created_at: cart.created_at,
            updated_at: cart.updated_at,
            expires_at: cart.expires_at,
        })
    }

    /// Adds units of a variant, creating the cart if the token has none yet.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        guest_token: GuestToken,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<Cart, DomainError> {
        let _guard = self.lock(guest_token).await;

        let product = self.catalog.find_active_product(product_id).await?;
        let variant = CatalogService::<S>::find_variant(&product, &variant_id)?.clone();

        let current = self.load_for_update(guest_token, true).await?;
        self.commit(guest_token, current, true, "add_item", |cart| {
            cart.add_item(&product, &variant, quantity)
        })
        .await
    }

    /// Sets a line's quantity, re-checked against live stock.
    #[tracing::instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        guest_token: GuestToken,
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<Cart, DomainError> {
        let _guard = self.lock(guest_token).await;

        let current = self.load_for_update(guest_token, false).await?;
        if current.0.item(product_id, &variant_id).is_none() {
            return Err(DomainError::not_found("Cart item", &variant_id));
        }

        let product = self.catalog.find_product(product_id).await?;
        let variant = CatalogService::<S>::find_variant(&product, &variant_id)?.clone();

        self.commit(guest_token, current, false, "update_item", |cart| {
            cart.set_item_quantity(&product, &variant, quantity)
        })
        .await
    }

    /// Removes one line.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        guest_token: GuestToken,
        product_id: ProductId,
        variant_id: VariantId,
    ) -> Result<Cart, DomainError> {
        let _guard = self.lock(guest_token).await;

        let current = self.load_for_update(guest_token, false).await?;
        self.commit(guest_token, current, false, "remove_item", |cart| {
            cart.remove_item(product_id, &variant_id).map(|_| ())
        })
        .await
    }

    /// Removes every line.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, guest_token: GuestToken) -> Result<Cart, DomainError> {
        let _guard = self.lock(guest_token).await;

        let current = self.load_for_update(guest_token, false).await?;
        self.commit(guest_token, current, false, "clear", |cart| {
            cart.clear();
            Ok(())
        })
        .await
    }

    /// Shows what a promo would do to the cart without changing anything.
    #[tracing::instrument(skip(self))]
    pub async fn preview_promo(
        &self,
        guest_token: GuestToken,
        code: &PromoCode,
    ) -> Result<PromoQuote, DomainError> {
        let cart = self.non_empty_cart(guest_token).await?;
        let promo = self
            .promotions
            .validate(code, cart.total_amount, Utc::now())
            .await?;
        let discount = PromotionService::<S>::compute_for_cart(&promo, &cart);

        Ok(PromoQuote::new(&promo, cart.total_amount, discount))
    }

    /// Validates a promo against the cart and attaches it, replacing any other.
    ///
    /// The promo's usage counter is not touched; that only happens at checkout.
    #[tracing::instrument(skip(self))]
    pub async fn apply_promo(
        &self,
        guest_token: GuestToken,
        code: &PromoCode,
    ) -> Result<PromoApplication, DomainError> {
        let _guard = self.lock(guest_token).await;

        let cart = self.non_empty_cart(guest_token).await?;
        let promo = self
            .promotions
            .validate(code, cart.total_amount, Utc::now())
            .await?;
        let discount_amount = PromotionService::<S>::compute_for_cart(&promo, &cart);

        let current = self.load_for_update(guest_token, false).await?;
        let applied = AppliedPromotion {
            code: promo.code.clone(),
            discount_amount,
        };
        let cart = self
            .commit(guest_token, current, false, "apply_promo", |cart| {
                cart.apply_promotion(applied.clone());
                Ok(())
            })
            .await?;

        tracing::info!(%guest_token, code = %promo.code, %discount_amount, "promo applied");
        let subtotal = cart.total_amount;
        Ok(PromoApplication {
            cart,
            promo: (&promo).into(),
            subtotal,
            discount_amount,
            final_total: final_total(subtotal, discount_amount),
        })
    }

    /// Detaches the applied promo. Does nothing if there is none.
    #[tracing::instrument(skip(self))]
    pub async fn remove_promo(&self, guest_token: GuestToken) -> Result<Cart, DomainError> {
        let _guard = self.lock(guest_token).await;

        let current = self.load_for_update(guest_token, false).await?;
        if current.0.applied_promo.is_none() {
            return Ok(current.0);
        }

        self.commit(guest_token, current, false, "remove_promo", |cart| {
            cart.remove_promotion();
            Ok(())
        })
        .await
    }

    async fn non_empty_cart(&self, guest_token: GuestToken) -> Result<Cart, DomainError> {
        match self.find(guest_token).await? {
            Some(cart) if !cart.is_empty() => Ok(cart),
            _ => Err(DomainError::EmptyCart),
        }
    }

    async fn load_for_update(
        &self,
        guest_token: GuestToken,
        create_missing: bool,
    ) -> Result<(Cart, Version), DomainError> {
        match self
            .store
            .load_as::<Cart>(CARTS, &guest_token.to_string())
            .await?
        {
            Some(found) => Ok(found),
            None if create_missing => Ok((
                Cart::new(guest_token, Utc::now(), self.ttl),
                Version::initial(),
            )),
            None => Err(DomainError::not_found("Cart", guest_token)),
        }
    }

    /// Applies `mutate`, then saves against the version the cart was read at.
    async fn commit<F>(
        &self,
        guest_token: GuestToken,
        current: (Cart, Version),
        create_missing: bool,
        op: &'static str,
        mut mutate: F,
    ) -> Result<Cart, DomainError>
    where
        F: FnMut(&mut Cart) -> Result<(), DomainError> + Send,
    {
        let (mut cart, mut version) = current;
        let mut retried = false;

        loop {
            mutate(&mut cart)?;
            cart.touch(Utc::now(), self.ttl);

            match self.save(&cart, version).await {
                Ok(()) => {
                    metrics::counter!("cart_mutations_total", "op" => op).increment(1);
                    return Ok(cart);
                }
                Err(e) if e.is_concurrency_conflict() && !retried => {
                    tracing::warn!(%guest_token, op, "cart changed concurrently, retrying once");
                    retried = true;
                    (cart, version) = self.load_for_update(guest_token, create_missing).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn save(&self, cart: &Cart, version: Version) -> Result<(), DomainError> {
        let options = if version == Version::initial() {
            SaveOptions::expect_new()
        } else {
            SaveOptions::expect_version(version)
        };
        self.store
            .save_as(
                CARTS,
                &cart.guest_token.to_string(),
                cart,
                Some(cart.expires_at),
                options,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Discount;
    use crate::{Money, NewProduct, NewPromo, PromoRejection, Variant};
    use common::Sku;
    use std::collections::BTreeMap;
    use store::InMemoryDocumentStore;

    struct Fixture {
        store: InMemoryDocumentStore,
        carts: CartService<InMemoryDocumentStore>,
        catalog: CatalogService<InMemoryDocumentStore>,
        promotions: PromotionService<InMemoryDocumentStore>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryDocumentStore::new();
        Fixture {
            carts: CartService::new(store.clone(), Duration::hours(DEFAULT_CART_TTL_HOURS)),
            catalog: CatalogService::new(store.clone()),
            promotions: PromotionService::new(store.clone()),
            store,
        }
    }

    async fn product(f: &Fixture, price_cents: i64, inventory: u32) -> Product {
        f.catalog
            .create_product(NewProduct {
                name: "Tee".to_string(),
                description: "Cotton tee".to_string(),
                category: "Clothing".to_string(),
                base_price: Money::from_cents(price_cents),
                variants: vec![Variant {
                    id: VariantId::new("v1"),
                    name: "Medium".to_string(),
                    price: Money::from_cents(price_cents),
                    sku: Sku::new(format!("TEE-{}", ProductId::new())),
                    inventory,
                    attributes: BTreeMap::new(),
                }],
                images: vec!["tee.jpg".to_string()],
            })
            .await
            .unwrap()
    }

    async fn promo(f: &Fixture, code: &str, discount: Discount, minimum: Option<Money>) {
        let now = Utc::now();
        f.promotions
            .create_promo(NewPromo {
                code: code.to_string(),
                name: code.to_string(),
                discount,
                minimum_order_amount: minimum,
                valid_from: now - Duration::days(1),
                valid_until: now + Duration::days(1),
                usage_limit: None,
                is_active: true,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn add_item_auto_creates_cart() {
        let f = fixture();
        let p = product(&f, 1000, 5).await;
        let token = GuestToken::generate();

        let cart = f
            .carts
            .add_item(token, p.id, VariantId::new("v1"), 2)
            .await
            .unwrap();

        assert_eq!(cart.guest_token, token);
        assert_eq!(cart.total_amount, Money::from_dollars(20));
        assert_eq!(f.carts.get(token).await.unwrap(), cart);
    }

    #[tokio::test]
    async fn add_item_rejects_inactive_products() {
        let f = fixture();
        let p = product(&f, 1000, 5).await;
        f.catalog.deactivate(p.id).await.unwrap();

        let result = f
            .carts
            .add_item(GuestToken::generate(), p.id, VariantId::new("v1"), 1)
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { entity: "Product", .. })));
    }

    #[tokio::test]
    async fn failed_merge_is_not_persisted() {
        let f = fixture();
        let p = product(&f, 1000, 4).await;
        let token = GuestToken::generate();
        let v1 = VariantId::new("v1");

        f.carts.add_item(token, p.id, v1.clone(), 2).await.unwrap();
        let result = f.carts.add_item(token, p.id, v1, 3).await;
        assert!(matches!(result, Err(DomainError::InsufficientInventory { .. })));

        let cart = f.carts.get(token).await.unwrap();
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.total_amount, Money::from_dollars(20));
    }

    #[tokio::test]
    async fn update_checks_line_then_stock() {
        let f = fixture();
        let p = product(&f, 500, 3).await;
        let token = GuestToken::generate();
        let v1 = VariantId::new("v1");

        let missing = f.carts.update_item_quantity(token, p.id, v1.clone(), 1).await;
        assert!(matches!(missing, Err(DomainError::NotFound { entity: "Cart", .. })));

        f.carts.add_item(token, p.id, v1.clone(), 1).await.unwrap();
        let cart = f
            .carts
            .update_item_quantity(token, p.id, v1.clone(), 3)
            .await
            .unwrap();
        assert_eq!(cart.total_amount, Money::from_cents(1500));

        let result = f.carts.update_item_quantity(token, p.id, v1, 4).await;
        assert!(matches!(result, Err(DomainError::InsufficientInventory { .. })));
    }

    #[tokio::test]
    async fn concurrent_adds_to_one_cart_are_not_lost() {
        let f = fixture();
        let p = product(&f, 100, 1000).await;
        let token = GuestToken::generate();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let carts = f.carts.clone();
            handles.push(tokio::spawn(async move {
                carts.add_item(token, p.id, VariantId::new("v1"), 1).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let cart = f.carts.get(token).await.unwrap();
        assert_eq!(cart.items[0].quantity, 20);
        assert_eq!(cart.total_amount, Money::from_dollars(20));
    }

    #[tokio::test]
    async fn promo_on_empty_cart_is_rejected() {
        let f = fixture();
        promo(&f, "SAVE5", Discount::Fixed { amount: Money::from_dollars(5) }, None).await;

        let cart = f.carts.create().await.unwrap();
        let result = f
            .carts
            .apply_promo(cart.guest_token, &PromoCode::new("SAVE5"))
            .await;
        assert!(matches!(result, Err(DomainError::EmptyCart)));

        let unknown = f
            .carts
            .preview_promo(GuestToken::generate(), &PromoCode::new("SAVE5"))
            .await;
        assert!(matches!(unknown, Err(DomainError::EmptyCart)));
    }

    #[tokio::test]
    async fn percentage_promo_is_capped() {
        let f = fixture();
        let p = product(&f, 10_000, 10).await;
        let token = GuestToken::generate();
        f.carts
            .add_item(token, p.id, VariantId::new("v1"), 3)
            .await
            .unwrap();
        promo(
            &f,
            "TENOFF",
            Discount::Percentage {
                basis_points: 1000,
                max_discount: Some(Money::from_dollars(20)),
            },
            None,
        )
        .await;

        let quote = f
            .carts
            .preview_promo(token, &PromoCode::new("tenoff"))
            .await
            .unwrap();
        assert_eq!(quote.subtotal, Money::from_dollars(300));
        assert_eq!(quote.discount_amount, Money::from_dollars(20));
        assert_eq!(quote.final_total, Money::from_dollars(280));
        assert!(f.carts.get(token).await.unwrap().applied_promo.is_none());

        let applied = f
            .carts
            .apply_promo(token, &PromoCode::new("TENOFF"))
            .await
            .unwrap();
        assert_eq!(applied.final_total, Money::from_dollars(280));
        assert_eq!(
            applied.cart.applied_promo.unwrap().discount_amount,
            Money::from_dollars(20)
        );
    }

    #[tokio::test]
    async fn minimum_order_is_checked_against_cart_total() {
        let f = fixture();
        let p = product(&f, 1000, 10).await;
        let token = GuestToken::generate();
        f.carts
            .add_item(token, p.id, VariantId::new("v1"), 1)
            .await
            .unwrap();
        promo(
            &f,
            "BIG",
            Discount::Fixed { amount: Money::from_dollars(5) },
            Some(Money::from_dollars(50)),
        )
        .await;

        let result = f.carts.apply_promo(token, &PromoCode::new("BIG")).await;
        assert!(matches!(
            result,
            Err(DomainError::PromoRejected {
                reason: PromoRejection::MinimumNotMet { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn second_promo_replaces_first_and_removal_is_idempotent() {
        let f = fixture();
        let p = product(&f, 5000, 10).await;
        let token = GuestToken::generate();
        f.carts
            .add_item(token, p.id, VariantId::new("v1"), 1)
            .await
            .unwrap();
        promo(&f, "A", Discount::Fixed { amount: Money::from_dollars(5) }, None).await;
        promo(&f, "B", Discount::Fixed { amount: Money::from_dollars(7) }, None).await;

        f.carts.apply_promo(token, &PromoCode::new("A")).await.unwrap();
        f.carts.apply_promo(token, &PromoCode::new("B")).await.unwrap();
        let cart = f.carts.get(token).await.unwrap();
        assert_eq!(cart.applied_promo.unwrap().code.as_str(), "B");

        let first = f.carts.remove_promo(token).await.unwrap();
        assert!(first.applied_promo.is_none());
        let second = f.carts.remove_promo(token).await.unwrap();
        assert_eq!(first, second);

        // Applying never consumes a use
        let b = f.promotions.find_promo(&PromoCode::new("B")).await.unwrap().unwrap();
        assert_eq!(b.used_count, 0);
    }

    #[tokio::test]
    async fn view_enriches_lines_and_survives_removed_variants() {
        let f = fixture();
        let p = product(&f, 1250, 10).await;
        let token = GuestToken::generate();
        f.carts
            .add_item(token, p.id, VariantId::new("v1"), 2)
            .await
            .unwrap();

        let view = f.carts.view(token).await.unwrap();
        assert_eq!(view.items[0].item_total, Money::from_cents(2500));
        assert_eq!(view.items[0].product.as_ref().unwrap().name, "Tee");
        assert_eq!(view.items[0].variant.as_ref().unwrap().inventory, 10);
        assert_eq!(view.total_amount, Money::from_cents(2500));
        assert_eq!(view.final_total, Money::from_cents(2500));

        let mut replacement = p.variants[0].clone();
        replacement.id = VariantId::new("v2");
        f.catalog
            .update_product(
                p.id,
                crate::ProductUpdate {
                    variants: Some(vec![replacement]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let view = f.carts.view(token).await.unwrap();
        assert!(view.items[0].variant.is_none());
        assert_eq!(view.total_amount, Money::from_cents(2500));
    }

    #[tokio::test]
    async fn carts_expire_after_ttl() {
        let store = InMemoryDocumentStore::new();
        let carts = CartService::new(store.clone(), Duration::milliseconds(-1));
        let cart = carts.create().await.unwrap();

        assert!(carts.find(cart.guest_token).await.unwrap().is_none());
        assert_eq!(store.document_count(CARTS).await, 0);
    }

    #[tokio::test]
    async fn clear_and_remove() {
        let f = fixture();
        let p = product(&f, 1000, 10).await;
        let token = GuestToken::generate();
        let v1 = VariantId::new("v1");
        f.carts.add_item(token, p.id, v1.clone(), 2).await.unwrap();

        let cart = f.carts.remove_item(token, p.id, v1.clone()).await.unwrap();
        assert!(cart.is_empty());
        assert!(f.carts.remove_item(token, p.id, v1.clone()).await.is_err());

        f.carts.add_item(token, p.id, v1, 2).await.unwrap();
        let cleared = f.carts.clear(token).await.unwrap();
        assert_eq!(cleared.total_amount, Money::zero());
        assert!(f.store.exists(CARTS, &token.to_string()).await.unwrap());
    }
}
