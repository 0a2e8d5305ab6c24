//! Domain error types.

use common::{ProductId, VariantId};
use store::StoreError;
use thiserror::Error;

/// Why a promotion code was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromoRejection {
    /// The code does not exist or is inactive.
    #[error("Invalid promo code")]
    NotFound,

    /// The current time is outside the validity window.
    #[error("Promo code has expired or is not yet valid")]
    Expired,

    /// The usage limit has been reached.
    #[error("Promo code usage limit exceeded")]
    LimitExceeded,

    /// The cart total is below the promo's minimum order amount.
    #[error("Minimum order amount of {minimum} required")]
    MinimumNotMet { minimum: crate::Money },
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A product, variant, cart, order or promo does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input violates a domain rule.
    #[error("Validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// Not enough stock to satisfy the requested quantity.
    #[error(
        "Insufficient inventory for {product_name} - {variant_name}: requested {requested}, available {available}"
    )]
    InsufficientInventory {
        product_id: ProductId,
        variant_id: VariantId,
        product_name: String,
        variant_name: String,
        requested: u32,
        available: u32,
    },

    /// A promotion code was refused.
    #[error("{reason}")]
    PromoRejected { code: String, reason: PromoRejection },

    /// The cart is missing or has no items.
    #[error("Cart is empty")]
    EmptyCart,

    /// An order status outside the known set.
    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    /// A unique field is already taken.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An error occurred in the document store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a single-message `ValidationFailed` error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(vec![message.into()])
    }

    /// Maps a promo rejection, turning a missing code into `NotFound`.
    pub fn promo(code: &common::PromoCode, reason: PromoRejection) -> Self {
        match reason {
            PromoRejection::NotFound => Self::not_found("Promo", code),
            reason => Self::PromoRejected {
                code: code.to_string(),
                reason,
            },
        }
    }

    /// Returns true if this wraps an optimistic concurrency conflict.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::ConcurrencyConflict { .. }))
    }
}
