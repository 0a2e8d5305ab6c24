//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use domain::{
    CategorySummary, Money, NewProduct, PageRequest, Product, ProductFilter, ProductPage,
    ProductUpdate,
};
use serde::Deserialize;
use store::DocumentStore;

use super::{ApiResult, Envelope, created, ok, parse_product_id};
use crate::AppState;
use crate::error::ApiError;

/// Query string of `GET /products`. Prices are in cents.
#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductQuery {
    fn into_filter(self) -> Result<ProductFilter, ApiError> {
        let defaults = PageRequest::default();
        let page = PageRequest::new(
            self.page.unwrap_or(defaults.page),
            self.limit.unwrap_or(defaults.limit),
        )?;
        Ok(ProductFilter {
            category: self.category,
            search: self.search,
            min_price: self.min_price.map(Money::from_cents),
            max_price: self.max_price.map(Money::from_cents),
            page,
        })
    }
}

/// POST /products
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Product>>), ApiError> {
    let Json(input) = payload?;
    let product = state.catalog.create_product(input).await?;
    created(product)
}

/// GET /products: active products, filtered and paginated.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> ApiResult<ProductPage> {
    let Query(query) = query?;
    ok(state.catalog.list_products(query.into_filter()?).await?)
}

/// GET /products/categories
pub async fn categories<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Vec<CategorySummary>> {
    ok(state.catalog.list_categories().await?)
}

/// GET /products/{id}: only active products are visible.
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<Product> {
    let product_id = parse_product_id(&id)?;
    ok(state.catalog.find_active_product(product_id).await?)
}

/// PUT /products/{id}: partial update.
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<ProductUpdate>, JsonRejection>,
) -> ApiResult<Product> {
    let product_id = parse_product_id(&id)?;
    let Json(update) = payload?;
    ok(state.catalog.update_product(product_id, update).await?)
}

/// DELETE /products/{id}: soft delete.
#[tracing::instrument(skip(state))]
pub async fn deactivate<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<Product> {
    let product_id = parse_product_id(&id)?;
    ok(state.catalog.deactivate(product_id).await?)
}
