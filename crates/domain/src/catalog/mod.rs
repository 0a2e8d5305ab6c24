//! Products, variants and their inventory counters.

mod product;
mod service;

pub use product::{CategorySummary, NewProduct, Product, ProductUpdate, Variant};
pub use service::{CatalogService, PRODUCTS, ProductFilter, ProductPage};
