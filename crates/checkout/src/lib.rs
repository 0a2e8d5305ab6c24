//! Checkout for the storefront: converts a guest cart into an order.
//!
//! A checkout follows these steps:
//! 1. Re-read every cart line and verify stock (no writes)
//! 2. Consume the applied promo, if any
//! 3. Write the order
//! 4. Reserve inventory line by line
//! 5. Delete the cart
//!
//! If a step in 2-4 fails, previously completed steps are undone in reverse
//! order. Every attempt leaves a [`CheckoutRecord`] behind.

pub mod coordinator;
pub mod error;
pub mod record;
pub mod state;

pub use coordinator::CheckoutCoordinator;
pub use error::{CheckoutError, Result};
pub use record::{CHECKOUTS, CheckoutRecord, CompletedStep};
pub use state::CheckoutState;
