//! Read models returned by the cart engine.

use chrono::{DateTime, Utc};
use common::{GuestToken, ProductId, PromoCode, VariantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AppliedPromotion, Cart};
use crate::money::Discount;
use crate::{Money, Promo, Variant};

/// The parts of a product shown next to a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    pub images: Vec<String>,
}

/// A cart line enriched with live catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineView {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub quantity: u32,
    pub unit_price: Money,
    pub item_total: Money,
    /// `None` if the product no longer exists.
    pub product: Option<ProductSummary>,
    /// The live variant, or `None` if it was removed from the product.
    pub variant: Option<Variant>,
}

/// A cart as shown to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub cart_id: Uuid,
    pub guest_token: GuestToken,
    pub items: Vec<CartLineView>,
    /// Recomputed from the lines, never read from the cache.
    pub total_amount: Money,
    pub applied_promo: Option<AppliedPromotion>,
    pub discount_amount: Money,
    pub final_total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Public description of a promo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoSummary {
    pub code: PromoCode,
    pub name: String,
    #[serde(flatten)]
    pub discount: Discount,
}

impl From<&Promo> for PromoSummary {
    fn from(promo: &Promo) -> Self {
        Self {
            code: promo.code.clone(),
            name: promo.name.clone(),
            discount: promo.discount,
        }
    }
}

/// What a promo would do to a cart, without applying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoQuote {
    pub promo: PromoSummary,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub final_total: Money,
}

impl PromoQuote {
    pub fn new(promo: &Promo, subtotal: Money, discount_amount: Money) -> Self {
        Self {
            promo: promo.into(),
            subtotal,
            discount_amount,
            final_total: final_total(subtotal, discount_amount),
        }
    }
}

/// The result of applying a promo to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoApplication {
    pub cart: Cart,
    pub promo: PromoSummary,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub final_total: Money,
}

/// Total after discount, floored at zero.
pub fn final_total(subtotal: Money, discount: Money) -> Money {
    (subtotal - discount).max(Money::zero())
}
