//! Domain layer for the storefront backend.
//!
//! This crate holds the pricing and order-consistency rules:
//! - Money arithmetic and discount math
//! - Catalog products, variants and inventory counters
//! - Promotion code validation and usage counting
//! - The cart engine with per-token serialized mutations
//! - Orders, their status and shipping address
//!
//! Every service is generic over a [`store::DocumentStore`].

pub mod cart;
pub mod catalog;
pub mod error;
pub mod money;
pub mod order;
pub mod pagination;
pub mod promotion;

pub use cart::{
    AppliedPromotion, CARTS, Cart, CartItem, CartLineView, CartService, CartView,
    DEFAULT_CART_TTL_HOURS, PromoApplication, PromoQuote, PromoSummary,
};
pub use catalog::{
    CatalogService, CategorySummary, NewProduct, PRODUCTS, Product, ProductFilter, ProductPage,
    ProductUpdate, Variant,
};
pub use error::{DomainError, PromoRejection};
pub use money::{Discount, Money, compute_discount, round2};
pub use order::{
    ORDERS, Order, OrderItem, OrderPage, OrderService, OrderStatus, ShippingAddress,
};
pub use pagination::{PageRequest, Pagination};
pub use promotion::{NewPromo, PROMOS, Promo, PromotionService};
