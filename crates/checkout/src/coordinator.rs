//! Checkout coordinator: turns a cart into an order.

use std::time::Instant;

use chrono::Utc;
use common::GuestToken;
use domain::cart::CartItem;
use domain::{
    CartService, CatalogService, DomainError, Order, OrderItem, OrderService, OrderStatus,
    PromotionService, ShippingAddress,
};
use futures_util::future::try_join_all;
use store::{DocumentStore, DocumentStoreExt, SaveOptions, StoreError, Version};
use uuid::Uuid;

use crate::error::{CheckoutError, Result};
use crate::record::{CHECKOUTS, CheckoutRecord, CompletedStep};
use crate::state::CheckoutState;

/// Orchestrates the conversion of a cart into an order.
///
/// There is no transaction spanning documents, so checkout runs in two passes.
/// The first pass re-reads every line's product and checks stock without
/// writing anything. The second pass consumes the promo, writes the order,
/// reserves each line and deletes the cart, recording each completed step.
/// If a later step fails, completed steps are undone in reverse order.
///
/// A crash between steps leaves a `running` record behind that names every
/// step up to its last successful write. A step applied just before the
/// crash may be missing from it.
#[derive(Clone)]
pub struct CheckoutCoordinator<S: DocumentStore> {
    store: S,
    carts: CartService<S>,
    catalog: CatalogService<S>,
    promotions: PromotionService<S>,
    orders: OrderService<S>,
}

impl<S: DocumentStore + Clone> CheckoutCoordinator<S> {
    /// Creates a coordinator. `carts` must be the service that handles the
    /// shoppers' cart mutations so both share the per-token locks.
    pub fn new(store: S, carts: CartService<S>) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            promotions: PromotionService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            store,
            carts,
        }
    }

    /// Converts the guest's cart into a pending order.
    ///
    /// Retrying after a failure is safe: if the cart was already converted,
    /// the existing order is returned and the leftover cart is removed.
    #[tracing::instrument(skip(self, shipping_address))]
    pub async fn create_order(
        &self,
        guest_token: GuestToken,
        shipping_address: ShippingAddress,
    ) -> Result<Order> {
        metrics::counter!("checkout_total").increment(1);
        let started = Instant::now();

        let result = self.run(guest_token, shipping_address).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!("checkout_failed", "reason" => failure_label(e)).increment(1);
        }
        result
    }

    /// Loads a checkout record by ID.
    pub async fn get_checkout(&self, checkout_id: Uuid) -> Result<Option<CheckoutRecord>> {
        Ok(self
            .store
            .load_as::<CheckoutRecord>(CHECKOUTS, &checkout_id.to_string())
            .await?
            .map(|(record, _)| record))
    }

    async fn run(
        &self,
        guest_token: GuestToken,
        shipping_address: ShippingAddress,
    ) -> Result<Order> {
        let shipping_address = shipping_address
            .normalize()
            .map_err(DomainError::ValidationFailed)?;

        let _guard = self.carts.lock(guest_token).await;

        let cart = match self.carts.find(guest_token).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Err(DomainError::EmptyCart.into()),
        };

        if let Some(order) = self.orders.find_by_cart_id(cart.cart_id).await? {
            tracing::warn!(
                order_number = %order.order_number,
                "cart was already converted, finishing cleanup"
            );
            self.carts.delete(guest_token).await?;
            return Ok(order);
        }

        // Pass 1: nothing is written if any line fails here.
        let items = try_join_all(cart.items.iter().map(|item| self.freeze_line(item))).await?;

        let mut record = CheckoutRecord::start(cart.cart_id, guest_token, Utc::now());
        let mut version = self.persist(&record, Version::initial()).await?;
        tracing::info!(checkout_id = %record.checkout_id, lines = items.len(), "checkout started");

        // Pass 2: a step stays on `record` even if saving it fails.
        if let Some(applied) = &cart.applied_promo {
            if let Err(e) = self.promotions.consume(&applied.code).await {
                return self.abort(record, version, e).await;
            }
            let step = CompletedStep::PromoConsumed {
                code: applied.code.clone(),
            };
            if let Err(e) = self.complete(&mut record, &mut version, step).await {
                return self.abort(record, version, e).await;
            }
        }

        let order = Order::place(&cart, items, shipping_address, Utc::now());
        if let Err(e) = self.orders.create(&order).await {
            return self.abort(record, version, e).await;
        }
        let step = CompletedStep::OrderCreated {
            order_number: order.order_number.clone(),
        };
        if let Err(e) = self.complete(&mut record, &mut version, step).await {
            return self.abort(record, version, e).await;
        }

        for item in &order.items {
            if let Err(e) = self
                .catalog
                .reserve(item.product_id, &item.variant_id, item.quantity)
                .await
            {
                return self.abort(record, version, e).await;
            }
            let step = CompletedStep::InventoryReserved {
                product_id: item.product_id,
                variant_id: item.variant_id.clone(),
                quantity: item.quantity,
            };
            if let Err(e) = self.complete(&mut record, &mut version, step).await {
                return self.abort(record, version, e).await;
            }
        }

        // The order stands from here on; a retry finishes this step.
        if let Err(e) = self.carts.delete(guest_token).await {
            tracing::error!(
                checkout_id = %record.checkout_id,
                order_number = %order.order_number,
                error = %e,
                "cart deletion failed after order was created"
            );
            record.failure_reason = Some(format!("delete_cart: {e}"));
            record.updated_at = Utc::now();
            self.persist_logged(&record, &mut version).await;
            return Err(e.into());
        }

        record.complete_step(CompletedStep::CartDeleted, Utc::now());
        record.state = CheckoutState::Completed;
        self.persist_logged(&record, &mut version).await;

        tracing::info!(
            checkout_id = %record.checkout_id,
            order_number = %order.order_number,
            total = %order.total_amount,
            units = order.total_quantity(),
            "checkout completed"
        );
        Ok(order)
    }

    /// Re-reads a line's product and variant and checks live stock.
    async fn freeze_line(&self, item: &CartItem) -> std::result::Result<OrderItem, DomainError> {
        let product = self.catalog.find_product(item.product_id).await?;
        let variant = CatalogService::<S>::find_variant(&product, &item.variant_id)?;
        if !CatalogService::<S>::check_available(variant, item.quantity) {
            return Err(product.shortage(variant, item.quantity));
        }
        Ok(OrderItem::snapshot(&product, variant, item))
    }

    /// Records a completed step and persists the record.
    ///
    /// The step is kept on `record` even if the write fails.
    async fn complete(
        &self,
        record: &mut CheckoutRecord,
        version: &mut Version,
        step: CompletedStep,
    ) -> std::result::Result<(), DomainError> {
        tracing::debug!(checkout_id = %record.checkout_id, step = step.name(), "checkout step completed");
        record.complete_step(step, Utc::now());
        *version = self.persist(record, *version).await?;
        Ok(())
    }

    /// Undoes completed steps in reverse order, then reports `cause`.
    ///
    /// Record writes here are best effort: a failed write is logged and
    /// every undo still runs.
    #[tracing::instrument(skip(self, record, version), fields(checkout_id = %record.checkout_id))]
    async fn abort(
        &self,
        mut record: CheckoutRecord,
        mut version: Version,
        cause: DomainError,
    ) -> Result<Order> {
        tracing::warn!(error = %cause, "checkout step failed, compensating");

        record.failure_reason = Some(cause.to_string());
        if record.state.can_compensate() {
            record.state = CheckoutState::Compensating;
        }
        record.updated_at = Utc::now();
        self.persist_logged(&record, &mut version).await;

        let completed = record.completed_steps.clone();
        for step in completed.iter().rev() {
            match self.undo(step).await {
                Ok(()) => tracing::info!(step = step.name(), "compensation step completed"),
                Err(e) => {
                    tracing::error!(step = step.name(), error = %e, "compensation step failed");
                    record.unreverted_steps.push(step.clone());
                }
            }
        }

        record.state = CheckoutState::Failed;
        record.updated_at = Utc::now();
        self.persist_logged(&record, &mut version).await;

        if record.unreverted_steps.is_empty() {
            Err(cause.into())
        } else {
            let steps: Vec<&str> = record.unreverted_steps.iter().map(|s| s.name()).collect();
            Err(CheckoutError::CompensationFailed {
                checkout_id: record.checkout_id,
                reason: format!("{cause}; not undone: {}", steps.join(", ")),
            })
        }
    }

    async fn undo(&self, step: &CompletedStep) -> std::result::Result<(), DomainError> {
        match step {
            CompletedStep::PromoConsumed { code } => {
                self.promotions.release(code).await?;
            }
            CompletedStep::OrderCreated { order_number } => {
                self.orders
                    .update_status(order_number, OrderStatus::Cancelled)
                    .await?;
            }
            CompletedStep::InventoryReserved {
                product_id,
                variant_id,
                quantity,
            } => {
                self.catalog
                    .release(*product_id, variant_id, *quantity)
                    .await?;
            }
            CompletedStep::CartDeleted => {}
        }
        Ok(())
    }

    async fn persist(
        &self,
        record: &CheckoutRecord,
        version: Version,
    ) -> std::result::Result<Version, StoreError> {
        let options = if version == Version::initial() {
            SaveOptions::expect_new()
        } else {
            SaveOptions::expect_version(version)
        };
        self.store
            .save_as(
                CHECKOUTS,
                &record.checkout_id.to_string(),
                record,
                None,
                options,
            )
            .await
    }

    /// Persists the record, logging instead of failing.
    ///
    /// On a version conflict the stored version is re-read and the write is
    /// tried once more, since this record has a single writer.
    async fn persist_logged(&self, record: &CheckoutRecord, version: &mut Version) {
        let result = match self.persist(record, *version).await {
            Err(StoreError::ConcurrencyConflict { actual, .. }) => {
                self.persist(record, actual).await
            }
            other => other,
        };
        match result {
            Ok(v) => *version = v,
            Err(e) => tracing::error!(
                checkout_id = %record.checkout_id,
                state = record.state.as_str(),
                steps = record.completed_steps.len(),
                error = %e,
                "failed to persist checkout record"
            ),
        }
    }
}

fn failure_label(error: &CheckoutError) -> &'static str {
    match error {
        CheckoutError::Domain(DomainError::EmptyCart) => "empty_cart",
        CheckoutError::Domain(DomainError::InsufficientInventory { .. }) => "insufficient_inventory",
        CheckoutError::Domain(DomainError::PromoRejected { .. }) => "promo_rejected",
        CheckoutError::Domain(DomainError::NotFound { .. }) => "not_found",
        CheckoutError::Domain(DomainError::ValidationFailed(_)) => "validation",
        CheckoutError::CompensationFailed { .. } => "compensation_failed",
        _ => "internal",
    }
}
