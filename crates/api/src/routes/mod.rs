//! Route handlers and the success envelope they share.

pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod promos;

use axum::Json;
use axum::http::StatusCode;
use common::{GuestToken, ProductId};
use serde::Serialize;

use crate::error::ApiError;

/// Successful response body: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

pub(crate) fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        data,
    }))
}

pub(crate) fn created<T: Serialize>(
    data: T,
) -> Result<(StatusCode, Json<Envelope<T>>), ApiError> {
    Ok((
        StatusCode::CREATED,
        Json(Envelope {
            success: true,
            data,
        }),
    ))
}

pub(crate) fn parse_guest_token(raw: &str) -> Result<GuestToken, ApiError> {
    GuestToken::parse(raw).map_err(|_| ApiError::BadRequest("Invalid guest token format".to_string()))
}

pub(crate) fn parse_product_id(raw: &str) -> Result<ProductId, ApiError> {
    ProductId::parse(raw).map_err(|_| ApiError::BadRequest("Invalid product ID".to_string()))
}
