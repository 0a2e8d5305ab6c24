//! Cart engine: the mutable pre-purchase aggregate and its service.

mod aggregate;
mod locks;
mod service;
mod view;

pub use aggregate::{AppliedPromotion, Cart, CartItem};
pub use locks::KeyedLocks;
pub use service::{CARTS, CartService, DEFAULT_CART_TTL_HOURS};
pub use view::{
    CartLineView, CartView, ProductSummary, PromoApplication, PromoQuote, PromoSummary, final_total,
};
