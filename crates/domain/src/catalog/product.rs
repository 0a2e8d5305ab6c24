//! Product and variant entities.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use common::{ProductId, Sku, VariantId};
use serde::{Deserialize, Serialize};

use crate::{DomainError, Money};

const MAX_NAME_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 2000;
const MAX_CATEGORY_LEN: usize = 100;

/// A purchasable SKU within a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Unique within the owning product.
    pub id: VariantId,
    pub name: String,
    /// Unit price; may differ from the product's base price.
    pub price: Money,
    /// Globally unique.
    pub sku: Sku,
    /// Units on hand. Unsigned, so it can never go below zero.
    pub inventory: u32,
    /// Free-form attributes such as color or size. Keys are unique and
    /// compare in lexical order; insertion order carries no meaning.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Variant {
    /// Returns true if `quantity` units can be taken from current stock.
    pub fn check_available(&self, quantity: u32) -> bool {
        self.inventory >= quantity
    }
}

/// A catalog entry.
///
/// Products are never hard-deleted; deactivating one hides it from browsing
/// and from new cart additions while orders can still resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub base_price: Money,
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub images: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Looks up a variant by ID.
    pub fn variant(&self, variant_id: &VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| &v.id == variant_id)
    }

    /// Returns the position of a variant, used to address its inventory counter.
    pub fn variant_index(&self, variant_id: &VariantId) -> Option<usize> {
        self.variants.iter().position(|v| &v.id == variant_id)
    }

    /// The error reported when `variant` can't cover `requested` units.
    pub fn shortage(&self, variant: &Variant, requested: u32) -> DomainError {
        DomainError::InsufficientInventory {
            product_id: self.id,
            variant_id: variant.id.clone(),
            product_name: self.name.clone(),
            variant_name: variant.name.clone(),
            requested,
            available: variant.inventory,
        }
    }

    /// JSON pointer to a variant's inventory counter inside the stored document.
    pub fn inventory_path(index: usize) -> String {
        format!("/variants/{index}/inventory")
    }

    /// JSON pointer to a variant's id, used to pin writes to that variant.
    pub fn variant_id_path(index: usize) -> String {
        format!("/variants/{index}/id")
    }

    /// Checks every field-level rule, collecting all problems.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        check_text(&mut problems, "name", &self.name, MAX_NAME_LEN);
        check_text(&mut problems, "description", &self.description, MAX_DESCRIPTION_LEN);
        check_text(&mut problems, "category", &self.category, MAX_CATEGORY_LEN);

        if self.base_price.is_negative() {
            problems.push("base_price must not be negative".to_string());
        }
        if self.variants.is_empty() {
            problems.push("at least one variant is required".to_string());
        }

        let mut ids = HashSet::new();
        let mut skus = HashSet::new();
        for variant in &self.variants {
            if variant.id.as_str().trim().is_empty() {
                problems.push("variant id must not be empty".to_string());
            }
            if variant.name.trim().is_empty() {
                problems.push(format!("variant {} must have a name", variant.id));
            }
            if variant.sku.as_str().trim().is_empty() {
                problems.push(format!("variant {} must have a sku", variant.id));
            }
            if variant.price.is_negative() {
                problems.push(format!("variant {} price must not be negative", variant.id));
            }
            if !ids.insert(&variant.id) {
                problems.push(format!("duplicate variant id {}", variant.id));
            }
            if !skus.insert(&variant.sku) {
                problems.push(format!("duplicate sku {}", variant.sku));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

fn check_text(problems: &mut Vec<String>, field: &str, value: &str, max: usize) {
    let len = value.trim().chars().count();
    if len == 0 || len > max {
        problems.push(format!("{field} must be between 1 and {max} characters"));
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub category: String,
    pub base_price: Money,
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl NewProduct {
    /// Turns the input into an active product with a fresh ID.
    pub fn into_product(self, now: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::new(),
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            category: self.category.trim().to_string(),
            base_price: self.base_price,
            variants: self.variants,
            images: self.images,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a product. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub base_price: Option<Money>,
    pub variants: Option<Vec<Variant>>,
    pub images: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl ProductUpdate {
    /// Applies the present fields to `product`.
    pub fn apply_to(self, product: &mut Product, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            product.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            product.description = description.trim().to_string();
        }
        if let Some(category) = self.category {
            product.category = category.trim().to_string();
        }
        if let Some(base_price) = self.base_price {
            product.base_price = base_price;
        }
        if let Some(variants) = self.variants {
            product.variants = variants;
        }
        if let Some(images) = self.images {
            product.images = images;
        }
        if let Some(is_active) = self.is_active {
            product.is_active = is_active;
        }
        product.updated_at = now;
    }
}

/// An active category and how many active products it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub name: String,
    pub product_count: u64,
}
