//! The immutable order record.

use chrono::{DateTime, Utc};
use common::{GuestToken, OrderNumber, ProductId, PromoCode, VariantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{OrderStatus, ShippingAddress};
use crate::{Cart, Money, Product, Variant, cart::CartItem};

/// A frozen copy of a cart line.
///
/// Names and prices are copied so later catalog edits never change a
/// historical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: u32,
    /// The price captured on the cart line, not the live variant price.
    pub unit_price: Money,
    pub total_price: Money,
}

impl OrderItem {
    /// Freezes a cart line together with the live product and variant it points at.
    pub fn snapshot(product: &Product, variant: &Variant, item: &CartItem) -> Self {
        Self {
            product_id: item.product_id,
            variant_id: item.variant_id.clone(),
            product_name: product.name.clone(),
            variant_name: variant.name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.line_total(),
        }
    }
}

/// Purchase record created exactly once per successful checkout.
///
/// Only `status` and `updated_at` change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_number: OrderNumber,
    pub guest_token: GuestToken,
    /// The cart this order was converted from; makes checkout retries idempotent.
    pub cart_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount_amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<PromoCode>,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a pending order from a cart and its frozen lines.
    ///
    /// The discount is the one stored on the cart when the promo was applied,
    /// even if the cart changed since. The only adjustment is a clamp to
    /// `[0, subtotal]`, which matters when the cart shrank below the
    /// discount; otherwise the amount is carried unchanged.
    pub fn place(
        cart: &Cart,
        items: Vec<OrderItem>,
        shipping_address: ShippingAddress,
        now: DateTime<Utc>,
    ) -> Self {
        let subtotal: Money = items.iter().map(|i| i.total_price).sum();
        let discount_amount = cart.discount_amount().min(subtotal).max(Money::zero());

        Self {
            order_number: OrderNumber::generate(),
            guest_token: cart.guest_token,
            cart_id: cart.cart_id,
            items,
            subtotal,
            discount_amount,
            promo_code: cart.applied_promo.as_ref().map(|p| p.code.clone()),
            total_amount: subtotal - discount_amount,
            status: OrderStatus::Pending,
            shipping_address,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total number of units across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewProduct;
    use crate::cart::AppliedPromotion;
    use chrono::Duration;
    use common::Sku;
    use std::collections::BTreeMap;

    fn product() -> Product {
        NewProduct {
            name: "Widget".to_string(),
            description: "A widget".to_string(),
            category: "Tools".to_string(),
            base_price: Money::from_dollars(10),
            variants: vec![Variant {
                id: VariantId::new("blue"),
                name: "Blue".to_string(),
                price: Money::from_dollars(10),
                sku: Sku::new("W-BLUE"),
                inventory: 10,
                attributes: BTreeMap::new(),
            }],
            images: vec![],
        }
        .into_product(Utc::now())
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "5551234567".to_string(),
            address: "12 Analytical Way".to_string(),
            city: "London".to_string(),
            state: "LDN".to_string(),
            zip_code: "N1".to_string(),
            country: "UK".to_string(),
        }
    }

    fn cart_with(product: &Product, quantity: u32) -> Cart {
        let mut cart = Cart::new(GuestToken::generate(), Utc::now(), Duration::hours(1));
        cart.add_item(product, &product.variants[0], quantity).unwrap();
        cart
    }

    fn lines(product: &Product, cart: &Cart) -> Vec<OrderItem> {
        cart.items
            .iter()
            .map(|item| OrderItem::snapshot(product, &product.variants[0], item))
            .collect()
    }

    #[test]
    fn test_place_order_without_promo() {
        let product = product();
        let cart = cart_with(&product, 3);

        let order = Order::place(&cart, lines(&product, &cart), address(), Utc::now());

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.cart_id, cart.cart_id);
        assert_eq!(order.subtotal, Money::from_dollars(30));
        assert_eq!(order.discount_amount, Money::zero());
        assert_eq!(order.total_amount, Money::from_dollars(30));
        assert_eq!(order.items[0].product_name, "Widget");
        assert_eq!(order.items[0].variant_name, "Blue");
        assert_eq!(order.total_quantity(), 3);
        assert!(order.order_number.as_str().starts_with("ORD-"));
    }

    #[test]
    fn test_snapshot_uses_cart_price_not_live_price() {
        let mut product = product();
        let cart = cart_with(&product, 1);
        product.variants[0].price = Money::from_dollars(99);
        product.name = "Renamed".to_string();

        let order = Order::place(&cart, lines(&product, &cart), address(), Utc::now());

        assert_eq!(order.items[0].unit_price, Money::from_dollars(10));
        assert_eq!(order.items[0].product_name, "Renamed");
    }

    #[test]
    fn test_stale_discount_is_carried_verbatim() {
        let product = product();
        let mut cart = cart_with(&product, 2);
        cart.apply_promotion(AppliedPromotion {
            code: PromoCode::new("SAVE5"),
            discount_amount: Money::from_cents(350),
        });
        // Cart grows after the promo was applied; the discount stays put.
        cart.add_item(&product, &product.variants[0], 3).unwrap();

        let order = Order::place(&cart, lines(&product, &cart), address(), Utc::now());

        assert_eq!(order.subtotal, Money::from_dollars(50));
        assert_eq!(order.discount_amount, Money::from_cents(350));
        assert_eq!(order.total_amount, Money::from_cents(4650));
        assert_eq!(order.promo_code, Some(PromoCode::new("SAVE5")));
    }

    #[test]
    fn test_stale_discount_never_makes_total_negative() {
        let product = product();
        let mut cart = cart_with(&product, 1);
        cart.apply_promotion(AppliedPromotion {
            code: PromoCode::new("BIG"),
            discount_amount: Money::from_dollars(25),
        });

        let order = Order::place(&cart, lines(&product, &cart), address(), Utc::now());

        assert_eq!(order.discount_amount, Money::from_dollars(10));
        assert_eq!(order.total_amount, Money::zero());
        assert_eq!(order.total_amount, order.subtotal - order.discount_amount);
    }

    #[test]
    fn test_stale_discount_is_clamped_when_cart_shrinks() {
        let product = product();
        let mut cart = cart_with(&product, 4);
        cart.apply_promotion(AppliedPromotion {
            code: PromoCode::new("TWENTY"),
            discount_amount: Money::from_dollars(20),
        });
        // Applied against $40; the cart then drops to $10.
        cart.set_item_quantity(&product, &product.variants[0], 1)
            .unwrap();
        assert_eq!(cart.discount_amount(), Money::from_dollars(20));

        let order = Order::place(&cart, lines(&product, &cart), address(), Utc::now());

        assert_eq!(order.subtotal, Money::from_dollars(10));
        assert_eq!(order.discount_amount, Money::from_dollars(10));
        assert_eq!(order.total_amount, Money::zero());
        assert_eq!(order.promo_code, Some(PromoCode::new("TWENTY")));
    }

    #[test]
    fn test_serialization() {
        let product = product();
        let cart = cart_with(&product, 2);
        let order = Order::place(&cart, lines(&product, &cart), address(), Utc::now());

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["total_amount"], 2000);
        assert!(json.get("promo_code").is_none());

        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }
}
