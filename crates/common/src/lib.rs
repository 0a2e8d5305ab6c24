//! Typed identifiers shared by every layer of the storefront backend.

pub mod types;

pub use types::{GuestToken, OrderNumber, ProductId, PromoCode, Sku, VariantId};
