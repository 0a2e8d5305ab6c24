//! Promotion codes: validation, discount computation and usage counting.

mod promo;
mod service;

pub use promo::{NewPromo, Promo, validate};
pub use service::{PROMOS, PromotionService};
