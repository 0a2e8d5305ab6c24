//! The cart aggregate and its line items.

use chrono::{DateTime, Duration, Utc};
use common::{GuestToken, ProductId, PromoCode, VariantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, Money, Product, Variant};

/// A line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    /// Always at least 1.
    pub quantity: u32,
    /// Variant price captured when the line was first added.
    pub unit_price: Money,
}

impl CartItem {
    /// Returns the line total (quantity × captured unit price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    fn matches(&self, product_id: ProductId, variant_id: &VariantId) -> bool {
        self.product_id == product_id && &self.variant_id == variant_id
    }
}

/// A promotion provisionally attached to a cart.
///
/// The discount is computed once, when the code is applied, and is not
/// refreshed when the cart changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPromotion {
    pub code: PromoCode,
    pub discount_amount: Money,
}

/// Mutable pre-purchase aggregate identified by a guest token.
///
/// `total_amount` is a cache of the sum of line totals; every mutating
/// method recomputes it from the lines before returning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Stable identity of this cart instance, carried onto the order it becomes.
    pub cart_id: Uuid,
    pub guest_token: GuestToken,
    pub items: Vec<CartItem>,
    pub total_amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_promo: Option<AppliedPromotion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a guest token.
    pub fn new(guest_token: GuestToken, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            cart_id: Uuid::new_v4(),
            guest_token,
            items: Vec::new(),
            total_amount: Money::zero(),
            applied_promo: None,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Finds the line for a product/variant pair.
    pub fn item(&self, product_id: ProductId, variant_id: &VariantId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.matches(product_id, variant_id))
    }

    /// Sum of all line totals, computed from the lines.
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// The applied discount, or zero.
    pub fn discount_amount(&self) -> Money {
        self.applied_promo
            .as_ref()
            .map_or(Money::zero(), |p| p.discount_amount)
    }

    /// Adds units of a variant.
    ///
    /// An existing line for the same variant is merged and the combined
    /// quantity is checked against stock; on failure nothing changes. A new
    /// line captures the variant's current price.
    pub fn add_item(
        &mut self,
        product: &Product,
        variant: &Variant,
        quantity: u32,
    ) -> Result<(), DomainError> {
        ensure_positive(quantity)?;

        match self
            .items
            .iter_mut()
            .find(|i| i.matches(product.id, &variant.id))
        {
            Some(line) => {
                let combined = line
                    .quantity
                    .checked_add(quantity)
                    .ok_or_else(|| product.shortage(variant, u32::MAX))?;
                if !variant.check_available(combined) {
                    return Err(product.shortage(variant, combined));
                }
                line.quantity = combined;
            }
            None => {
                if !variant.check_available(quantity) {
                    return Err(product.shortage(variant, quantity));
                }
                self.items.push(CartItem {
                    product_id: product.id,
                    variant_id: variant.id.clone(),
                    quantity,
                    unit_price: variant.price,
                });
            }
        }

        self.recompute_total();
        Ok(())
    }

    /// Sets a line's quantity to an absolute value, keeping its captured price.
    pub fn set_item_quantity(
        &mut self,
        product: &Product,
        variant: &Variant,
        quantity: u32,
    ) -> Result<(), DomainError> {
        ensure_positive(quantity)?;

        let line = self
            .items
            .iter_mut()
            .find(|i| i.matches(product.id, &variant.id))
            .ok_or_else(|| DomainError::not_found("Cart item", &variant.id))?;
        if !variant.check_available(quantity) {
            return Err(product.shortage(variant, quantity));
        }
        line.quantity = quantity;

        self.recompute_total();
        Ok(())
    }

    /// Removes one line.
    pub fn remove_item(
        &mut self,
        product_id: ProductId,
        variant_id: &VariantId,
    ) -> Result<CartItem, DomainError> {
        let index = self
            .items
            .iter()
            .position(|i| i.matches(product_id, variant_id))
            .ok_or_else(|| DomainError::not_found("Cart item", variant_id))?;
        let removed = self.items.remove(index);

        self.recompute_total();
        Ok(removed)
    }

    /// Removes every line.
    pub fn clear(&mut self) {
        self.items.clear();
        self.recompute_total();
    }

    /// Attaches a promotion, replacing any previous one.
    pub fn apply_promotion(&mut self, promotion: AppliedPromotion) {
        self.applied_promo = Some(promotion);
    }

    /// Detaches the promotion, if any.
    pub fn remove_promotion(&mut self) -> Option<AppliedPromotion> {
        self.applied_promo.take()
    }

    /// Stamps a mutation and pushes the expiry out by `ttl`.
    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.updated_at = now;
        self.expires_at = now + ttl;
    }

    fn recompute_total(&mut self) {
        self.total_amount = self.subtotal();
    }
}

fn ensure_positive(quantity: u32) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be at least 1"));
    }
    Ok(())
}
