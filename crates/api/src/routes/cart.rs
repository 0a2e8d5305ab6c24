//! Guest cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{GuestToken, VariantId};
use domain::{Cart, CartView};
use serde::{Deserialize, Serialize};
use store::DocumentStore;

use super::{ApiResult, Envelope, created, ok, parse_guest_token, parse_product_id};
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    pub variant_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct CartCreatedResponse {
    pub guest_token: GuestToken,
    pub cart: Cart,
}

/// POST /cart: starts an empty cart under a fresh guest token.
#[tracing::instrument(skip(state))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<(StatusCode, Json<Envelope<CartCreatedResponse>>), ApiError> {
    let cart = state.carts.create().await?;
    created(CartCreatedResponse {
        guest_token: cart.guest_token,
        cart,
    })
}

/// GET /cart/{guest_token}: the cart with live product data.
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(guest_token): Path<String>,
) -> ApiResult<CartView> {
    let guest_token = parse_guest_token(&guest_token)?;
    ok(state.carts.view(guest_token).await?)
}

/// POST /cart/{guest_token}/items: creates the cart if needed.
#[tracing::instrument(skip(state, payload))]
pub async fn add_item<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(guest_token): Path<String>,
    payload: Result<Json<AddItemRequest>, JsonRejection>,
) -> ApiResult<Cart> {
    let guest_token = parse_guest_token(&guest_token)?;
    let Json(req) = payload?;
    let product_id = parse_product_id(&req.product_id)?;

    ok(state
        .carts
        .add_item(
            guest_token,
            product_id,
            VariantId::new(req.variant_id),
            req.quantity,
        )
        .await?)
}

/// PUT /cart/{guest_token}/items/{product_id}/{variant_id}
#[tracing::instrument(skip(state, payload))]
pub async fn update_item<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((guest_token, product_id, variant_id)): Path<(String, String, String)>,
    payload: Result<Json<UpdateItemRequest>, JsonRejection>,
) -> ApiResult<Cart> {
    let guest_token = parse_guest_token(&guest_token)?;
    let product_id = parse_product_id(&product_id)?;
    let Json(req) = payload?;

    ok(state
        .carts
        .update_item_quantity(
            guest_token,
            product_id,
            VariantId::new(variant_id),
            req.quantity,
        )
        .await?)
}

/// DELETE /cart/{guest_token}/items/{product_id}/{variant_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((guest_token, product_id, variant_id)): Path<(String, String, String)>,
) -> ApiResult<Cart> {
    let guest_token = parse_guest_token(&guest_token)?;
    let product_id = parse_product_id(&product_id)?;

    ok(state
        .carts
        .remove_item(guest_token, product_id, VariantId::new(variant_id))
        .await?)
}

/// DELETE /cart/{guest_token}/clear: empties the lines, keeps the promo.
#[tracing::instrument(skip(state))]
pub async fn clear<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(guest_token): Path<String>,
) -> ApiResult<Cart> {
    let guest_token = parse_guest_token(&guest_token)?;
    ok(state.carts.clear(guest_token).await?)
}
