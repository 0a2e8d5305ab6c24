//! Checkout error types.

use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A domain rule refused the checkout. Nothing is left half-done.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A step failed and at least one completed step could not be undone.
    #[error("Checkout {checkout_id} failed and compensation is incomplete: {reason}")]
    CompensationFailed {
        checkout_id: uuid::Uuid,
        reason: String,
    },

    /// The checkout record could not be written.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
