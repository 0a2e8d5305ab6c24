//! Catalog service: product administration, browsing and inventory counters.

use std::collections::BTreeMap;

use chrono::Utc;
use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use store::{Bounds, DocumentQuery, DocumentStore, DocumentStoreExt, SaveOptions, StoreError};

use super::{CategorySummary, NewProduct, Product, ProductUpdate, Variant};
use crate::{DomainError, Money, PageRequest, Pagination};

/// Collection holding product documents.
pub const PRODUCTS: &str = "products";

const MAX_RELOCATE_ATTEMPTS: usize = 3;

enum InventoryError {
    /// The floor would be crossed; carries the product as loaded for the attempt.
    Short { product: Product, current: i64 },
    Domain(DomainError),
}

impl From<DomainError> for InventoryError {
    fn from(e: DomainError) -> Self {
        InventoryError::Domain(e)
    }
}

/// Filters for browsing the active catalog.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub category: Option<String>,
    /// Case-insensitive substring matched against name and description.
    pub search: Option<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub page: PageRequest,
}

/// One page of products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

/// Service for catalog operations.
#[derive(Clone)]
pub struct CatalogService<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> CatalogService<S> {
    /// Creates a new catalog service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a product after checking field rules and global SKU uniqueness.
    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: NewProduct) -> Result<Product, DomainError> {
        let product = input.into_product(Utc::now());
        product.validate().map_err(DomainError::ValidationFailed)?;
        self.ensure_unique_skus(&product).await?;

        self.store
            .save_as(
                PRODUCTS,
                &product.id.to_string(),
                &product,
                None,
                SaveOptions::expect_new(),
            )
            .await?;

        tracing::info!(product_id = %product.id, variants = product.variants.len(), "product created");
        Ok(product)
    }

    /// Loads a product whether or not it is active.
    pub async fn find_product(&self, product_id: ProductId) -> Result<Product, DomainError> {
        self.load(product_id).await.map(|(product, _)| product)
    }

    /// Loads a product, treating deactivated products as missing.
    pub async fn find_active_product(&self, product_id: ProductId) -> Result<Product, DomainError> {
        let product = self.find_product(product_id).await?;
        if !product.is_active {
            return Err(DomainError::not_found("Product", product_id));
        }
        Ok(product)
    }

    /// Looks up a variant within an already loaded product.
    pub fn find_variant<'a>(
        product: &'a Product,
        variant_id: &VariantId,
    ) -> Result<&'a Variant, DomainError> {
        product
            .variant(variant_id)
            .ok_or_else(|| DomainError::not_found("Variant", variant_id))
    }

    /// Returns true if the variant currently holds at least `quantity` units.
    pub fn check_available(variant: &Variant, quantity: u32) -> bool {
        variant.check_available(quantity)
    }

    /// Takes `quantity` units out of a variant's stock.
    ///
    /// The non-negative floor is enforced by the store at the moment of the
    /// write, so an earlier availability check is never relied upon.
    /// Returns the remaining stock.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        product_id: ProductId,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<u32, DomainError> {
        match self.adjust_inventory(product_id, variant_id, -i64::from(quantity)).await {
            Ok(remaining) => {
                metrics::counter!("inventory_reserved_units").increment(u64::from(quantity));
                tracing::info!(%product_id, %variant_id, quantity, remaining, "inventory reserved");
                Ok(remaining)
            }
            Err(InventoryError::Short { product, current }) => {
                metrics::counter!("store_adjust_conflicts_total", "counter" => "inventory")
                    .increment(1);
                let variant = Self::find_variant(&product, variant_id)?;
                Err(DomainError::InsufficientInventory {
                    product_id,
                    variant_id: variant_id.clone(),
                    product_name: product.name.clone(),
                    variant_name: variant.name.clone(),
                    requested: quantity,
                    available: u32::try_from(current).unwrap_or_default(),
                })
            }
            Err(InventoryError::Domain(e)) => Err(e),
        }
    }

    /// Puts `quantity` units back into a variant's stock. Returns the new stock.
    #[tracing::instrument(skip(self))]
    pub async fn release(
        &self,
        product_id: ProductId,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<u32, DomainError> {
        let restored = match self.adjust_inventory(product_id, variant_id, i64::from(quantity)).await {
            Ok(restored) => restored,
            Err(InventoryError::Short { current, .. }) => {
                return Err(DomainError::Conflict(format!(
                    "Stock of variant {variant_id} cannot be restored from {current}"
                )));
            }
            Err(InventoryError::Domain(e)) => return Err(e),
        };

        tracing::info!(%product_id, %variant_id, quantity, restored, "inventory released");
        Ok(restored)
    }

    /// Applies `delta` to one variant's stock.
    ///
    /// The write is guarded on the variant's id at the index it was found
    /// at. If an edit moved or removed the variant in between, the product is
    /// reloaded and the variant located again.
    async fn adjust_inventory(
        &self,
        product_id: ProductId,
        variant_id: &VariantId,
        delta: i64,
    ) -> Result<u32, InventoryError> {
        for _ in 0..MAX_RELOCATE_ATTEMPTS {
            let product = self.find_product(product_id).await?;
            let (index, _) = Self::locate(&product, variant_id)?;

            let result = self
                .store
                .adjust(
                    PRODUCTS,
                    &product_id.to_string(),
                    &Product::inventory_path(index),
                    delta,
                    Bounds::non_negative()
                        .guarded(Product::variant_id_path(index), json!(variant_id)),
                )
                .await;

            match result {
                Ok(value) => return Ok(u32::try_from(value).unwrap_or_default()),
                Err(StoreError::BoundViolation { current, .. }) => {
                    return Err(InventoryError::Short { product, current });
                }
                Err(StoreError::GuardMismatch { .. }) => {
                    tracing::debug!(%product_id, %variant_id, index, "variant moved, relocating");
                }
                Err(e) => return Err(InventoryError::Domain(e.into())),
            }
        }

        Err(DomainError::Conflict(format!(
            "Variant {variant_id} of product {product_id} kept moving during an inventory update"
        ))
        .into())
    }

    /// Applies a partial update, re-checking variant rules and SKU uniqueness.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, DomainError> {
        let (mut product, version) = self.load(product_id).await?;
        let variants_changed = update.variants.is_some();

        update.apply_to(&mut product, Utc::now());
        product.validate().map_err(DomainError::ValidationFailed)?;
        if variants_changed {
            self.ensure_unique_skus(&product).await?;
        }

        self.store
            .save_as(
                PRODUCTS,
                &product_id.to_string(),
                &product,
                None,
                SaveOptions::expect_version(version),
            )
            .await?;

        tracing::info!(%product_id, "product updated");
        Ok(product)
    }

    /// Soft-deletes a product by clearing its active flag.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, product_id: ProductId) -> Result<Product, DomainError> {
        self.update_product(
            product_id,
            ProductUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    /// Lists active products matching the filter.
    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self, filter: ProductFilter) -> Result<ProductPage, DomainError> {
        let mut query = DocumentQuery::collection(PRODUCTS).equals("/is_active", true);

        if let Some(category) = filter.category.as_deref().filter(|c| !c.trim().is_empty()) {
            query = query.equals("/category", category.trim());
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            query = query.text(&["/name", "/description"], search.trim());
        }
        if let Some(min) = filter.min_price {
            query = query.gte("/base_price", min.cents() as f64);
        }
        if let Some(max) = filter.max_price {
            query = query.lte("/base_price", max.cents() as f64);
        }

        let total = self.store.count(query.clone()).await?;
        let products: Vec<Product> = self
            .store
            .query_as(query.page(filter.page.page as usize, filter.page.limit as usize))
            .await?;

        Ok(ProductPage {
            products,
            pagination: filter.page.paginate(total),
        })
    }

    /// Lists categories of active products, sorted by name.
    #[tracing::instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<CategorySummary>, DomainError> {
        let products: Vec<Product> = self
            .store
            .query_as(DocumentQuery::collection(PRODUCTS).equals("/is_active", true))
            .await?;

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for product in products {
            *counts.entry(product.category).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(name, product_count)| CategorySummary {
                name,
                product_count,
            })
            .collect())
    }

    async fn load(
        &self,
        product_id: ProductId,
    ) -> Result<(Product, store::Version), DomainError> {
        self.store
            .load_as(PRODUCTS, &product_id.to_string())
            .await?
            .ok_or_else(|| DomainError::not_found("Product", product_id))
    }

    fn locate<'a>(
        product: &'a Product,
        variant_id: &VariantId,
    ) -> Result<(usize, &'a Variant), DomainError> {
        product
            .variant_index(variant_id)
            .map(|index| (index, &product.variants[index]))
            .ok_or_else(|| DomainError::not_found("Variant", variant_id))
    }

    /// Fails with `Conflict` if another product already uses one of this product's SKUs.
    async fn ensure_unique_skus(&self, product: &Product) -> Result<(), DomainError> {
        for variant in &product.variants {
            let holders = self
                .store
                .query(
                    DocumentQuery::collection(PRODUCTS)
                        .contains("/variants", json!([{ "sku": variant.sku }])),
                )
                .await?;

            if holders.iter().any(|doc| doc.key != product.id.to_string()) {
                return Err(DomainError::Conflict(format!(
                    "SKU {} is already in use",
                    variant.sku
                )));
            }
        }
        Ok(())
    }
}
