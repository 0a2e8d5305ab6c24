//! Order repository and administration.

use chrono::Utc;
use common::{GuestToken, OrderNumber};
use serde::{Deserialize, Serialize};
use serde_json::json;
use store::{DocumentQuery, DocumentStore, DocumentStoreExt, SaveOptions, StoreError, Version};
use uuid::Uuid;

use super::{Order, OrderStatus};
use crate::{DomainError, PageRequest, Pagination};

/// Collection holding order documents, keyed by order number.
pub const ORDERS: &str = "orders";

/// One page of orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

/// Service for managing orders.
///
/// Orders are written once by checkout; afterwards only their status moves.
#[derive(Clone)]
pub struct OrderService<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persists a newly placed order. Order numbers are never reused.
    #[tracing::instrument(skip(self, order), fields(order_number = %order.order_number))]
    pub async fn create(&self, order: &Order) -> Result<(), DomainError> {
        match self
            .store
            .save_as(
                ORDERS,
                order.order_number.as_str(),
                order,
                None,
                SaveOptions::expect_new(),
            )
            .await
        {
            Ok(_) => {
                tracing::info!(
                    guest_token = %order.guest_token,
                    total = %order.total_amount,
                    "order created"
                );
                Ok(())
            }
            Err(StoreError::ConcurrencyConflict { .. }) => Err(DomainError::Conflict(format!(
                "order number {} already exists",
                order.order_number
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Loads an order by number.
    pub async fn get_order(&self, order_number: &OrderNumber) -> Result<Order, DomainError> {
        self.load(order_number).await.map(|(order, _)| order)
    }

    /// Finds the live order a cart was converted into.
    ///
    /// Orders cancelled by a rolled-back checkout are skipped.
    pub async fn find_by_cart_id(&self, cart_id: Uuid) -> Result<Option<Order>, DomainError> {
        let found: Vec<Order> = self
            .store
            .query_as(DocumentQuery::collection(ORDERS).equals("/cart_id", json!(cart_id)))
            .await?;
        Ok(found
            .into_iter()
            .find(|order| order.status != OrderStatus::Cancelled))
    }

    /// Lists a guest's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_guest_token(
        &self,
        guest_token: GuestToken,
    ) -> Result<Vec<Order>, DomainError> {
        Ok(self
            .store
            .query_as(
                DocumentQuery::collection(ORDERS)
                    .equals("/guest_token", json!(guest_token))
                    .newest_first(),
            )
            .await?)
    }

    /// Lists all orders, optionally of one status, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<OrderPage, DomainError> {
        let mut query = DocumentQuery::collection(ORDERS).newest_first();
        if let Some(status) = status {
            query = query.equals("/status", status.as_str());
        }

        let total = self.store.count(query.clone()).await?;
        let orders = self
            .store
            .query_as(query.page(page.page as usize, page.limit as usize))
            .await?;

        Ok(OrderPage {
            orders,
            pagination: page.paginate(total),
        })
    }

    /// Overwrites an order's status.
    ///
    /// Any known status may follow any other. Concurrent writers are detected
    /// by version and the update is retried once.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_number: &OrderNumber,
        status: OrderStatus,
    ) -> Result<Order, DomainError> {
        let mut retried = false;
        loop {
            let (mut order, version) = self.load(order_number).await?;
            let previous = order.status;
            order.status = status;
            order.updated_at = Utc::now();

            match self
                .store
                .save_as(
                    ORDERS,
                    order_number.as_str(),
                    &order,
                    None,
                    SaveOptions::expect_version(version),
                )
                .await
            {
                Ok(_) => {
                    if previous.is_terminal() && !status.is_terminal() {
                        tracing::warn!(%order_number, from = %previous, to = %status, "closed order reopened");
                    }
                    tracing::info!(%order_number, from = %previous, to = %status, "order status updated");
                    return Ok(order);
                }
                Err(StoreError::ConcurrencyConflict { .. }) if !retried => retried = true,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn load(&self, order_number: &OrderNumber) -> Result<(Order, Version), DomainError> {
        self.store
            .load_as(ORDERS, order_number.as_str())
            .await?
            .ok_or_else(|| DomainError::not_found("Order", order_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{AppliedPromotion, Cart};
    use crate::order::{OrderItem, ShippingAddress};
    use crate::Money;
    use chrono::Duration;
    use common::{ProductId, PromoCode, VariantId};
    use store::InMemoryDocumentStore;

    fn address() -> ShippingAddress {
        ShippingAddress {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: "grace@example.com".to_string(),
            phone: "5559876543".to_string(),
            address: "1 Navy Yard".to_string(),
            city: "Arlington".to_string(),
            state: "VA".to_string(),
            zip_code: "22202".to_string(),
            country: "US".to_string(),
        }
    }

    fn order_for(guest_token: GuestToken, cents: i64) -> Order {
        let mut cart = Cart::new(guest_token, Utc::now(), Duration::hours(1));
        cart.apply_promotion(AppliedPromotion {
            code: PromoCode::new("WELCOME10"),
            discount_amount: Money::from_cents(100),
        });
        let item = OrderItem {
            product_id: ProductId::new(),
            variant_id: VariantId::new("v1"),
            product_name: "Lamp".to_string(),
            variant_name: "Brass".to_string(),
            quantity: 1,
            unit_price: Money::from_cents(cents),
            total_price: Money::from_cents(cents),
        };
        Order::place(&cart, vec![item], address(), Utc::now())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let service = OrderService::new(InMemoryDocumentStore::new());
        let order = order_for(GuestToken::generate(), 2500);

        service.create(&order).await.unwrap();
        let loaded = service.get_order(&order.order_number).await.unwrap();

        assert_eq!(loaded, order);
        assert_eq!(loaded.total_amount, Money::from_cents(2400));
    }

    #[tokio::test]
    async fn test_duplicate_order_number_conflicts() {
        let service = OrderService::new(InMemoryDocumentStore::new());
        let order = order_for(GuestToken::generate(), 2500);

        service.create(&order).await.unwrap();
        let result = service.create(&order).await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_get_missing_order() {
        let service = OrderService::new(InMemoryDocumentStore::new());
        let result = service.get_order(&OrderNumber::new("ORD-0-NOPE00")).await;
        assert!(matches!(result, Err(DomainError::NotFound { entity: "Order", .. })));
    }

    #[tokio::test]
    async fn test_find_by_cart_id() {
        let service = OrderService::new(InMemoryDocumentStore::new());
        let order = order_for(GuestToken::generate(), 1000);
        service.create(&order).await.unwrap();

        let found = service.find_by_cart_id(order.cart_id).await.unwrap();
        assert_eq!(found.map(|o| o.order_number), Some(order.order_number.clone()));
        assert!(service.find_by_cart_id(Uuid::new_v4()).await.unwrap().is_none());

        service
            .update_status(&order.order_number, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert!(service.find_by_cart_id(order.cart_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_guest_token_newest_first() {
        let service = OrderService::new(InMemoryDocumentStore::new());
        let guest = GuestToken::generate();

        let first = order_for(guest, 1000);
        service.create(&first).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = order_for(guest, 2000);
        service.create(&second).await.unwrap();
        service
            .create(&order_for(GuestToken::generate(), 3000))
            .await
            .unwrap();

        let orders = service.list_by_guest_token(guest).await.unwrap();
        let numbers: Vec<_> = orders.into_iter().map(|o| o.order_number).collect();
        assert_eq!(numbers, vec![second.order_number, first.order_number]);
    }

    #[tokio::test]
    async fn test_list_orders_filters_and_paginates() {
        let service = OrderService::new(InMemoryDocumentStore::new());
        for cents in [1000, 2000, 3000] {
            service
                .create(&order_for(GuestToken::generate(), cents))
                .await
                .unwrap();
        }
        let shipped = order_for(GuestToken::generate(), 4000);
        service.create(&shipped).await.unwrap();
        service
            .update_status(&shipped.order_number, OrderStatus::Shipped)
            .await
            .unwrap();

        let page = service
            .list_orders(None, PageRequest::new(2, 3).unwrap())
            .await
            .unwrap();
        assert_eq!(page.orders.len(), 1);
        assert_eq!(page.pagination.total, 4);
        assert_eq!(page.pagination.pages, 2);

        let page = service
            .list_orders(Some(OrderStatus::Shipped), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.orders.len(), 1);
        assert_eq!(page.orders[0].order_number, shipped.order_number);
    }

    #[tokio::test]
    async fn test_status_updates_are_permissive() {
        let service = OrderService::new(InMemoryDocumentStore::new());
        let order = order_for(GuestToken::generate(), 1000);
        service.create(&order).await.unwrap();

        let delivered = service
            .update_status(&order.order_number, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);

        // Backwards from a terminal status is accepted.
        let pending = service
            .update_status(&order.order_number, OrderStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.status, OrderStatus::Pending);
        assert_eq!(pending.total_amount, order.total_amount);
    }

    #[tokio::test]
    async fn test_invalid_status_leaves_order_unchanged() {
        let service = OrderService::new(InMemoryDocumentStore::new());
        let order = order_for(GuestToken::generate(), 1000);
        service.create(&order).await.unwrap();

        let parsed = "lost".parse::<OrderStatus>();
        assert!(matches!(parsed, Err(DomainError::InvalidStatus(_))));

        let loaded = service.get_order(&order.order_number).await.unwrap();
        assert_eq!(loaded.status, OrderStatus::Pending);
    }
}
