//! Checkout and order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::OrderNumber;
use domain::{Order, OrderPage, OrderStatus, PageRequest, ShippingAddress};
use serde::Deserialize;
use store::DocumentStore;

use super::{ApiResult, Envelope, created, ok, parse_guest_token};
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: ShippingAddress,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// POST /orders/{guest_token}: checks the guest's cart out.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(guest_token): Path<String>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Order>>), ApiError> {
    let guest_token = parse_guest_token(&guest_token)?;
    let Json(req) = payload?;
    let order = state
        .checkout
        .create_order(guest_token, req.shipping_address)
        .await?;
    created(order)
}

/// GET /orders: every order, newest first, optionally of one status.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<OrderQuery>, QueryRejection>,
) -> ApiResult<OrderPage> {
    let Query(query) = query?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()?;
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        query.page.unwrap_or(defaults.page),
        query.limit.unwrap_or(defaults.limit),
    )?;

    ok(state.orders.list_orders(status, page).await?)
}

/// GET /orders/guest/{guest_token}
#[tracing::instrument(skip(state))]
pub async fn list_for_guest<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(guest_token): Path<String>,
) -> ApiResult<Vec<Order>> {
    let guest_token = parse_guest_token(&guest_token)?;
    ok(state.orders.list_by_guest_token(guest_token).await?)
}

/// GET /orders/{order_number}
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_number): Path<String>,
) -> ApiResult<Order> {
    ok(state
        .orders
        .get_order(&OrderNumber::new(order_number))
        .await?)
}

/// PUT /orders/{order_number}/status
#[tracing::instrument(skip(state, payload))]
pub async fn update_status<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_number): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<Order> {
    let Json(req) = payload?;
    let status: OrderStatus = req.status.parse()?;
    ok(state
        .orders
        .update_status(&OrderNumber::new(order_number), status)
        .await?)
}
