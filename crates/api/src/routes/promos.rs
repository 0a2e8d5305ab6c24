//! Promo code endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::PromoCode;
use domain::{Cart, NewPromo, Promo, PromoApplication, PromoQuote};
use serde::Deserialize;
use store::DocumentStore;

use super::{ApiResult, Envelope, created, ok, parse_guest_token};
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PromoCodeRequest {
    #[serde(alias = "code")]
    pub promo_code: String,
}

impl PromoCodeRequest {
    fn code(&self) -> Result<PromoCode, ApiError> {
        let code = PromoCode::new(&self.promo_code);
        if code.as_str().is_empty() || code.as_str().len() > PromoCode::MAX_LEN {
            return Err(ApiError::BadRequest(format!(
                "promo_code must be 1 to {} characters",
                PromoCode::MAX_LEN
            )));
        }
        Ok(code)
    }
}

/// POST /promos
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<NewPromo>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Promo>>), ApiError> {
    let Json(input) = payload?;
    created(state.promotions.create_promo(input).await?)
}

/// GET /promos: active promos, newest first.
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Vec<Promo>> {
    ok(state.promotions.list_active().await?)
}

/// POST /promos/{guest_token}/validate: a quote, nothing is saved.
#[tracing::instrument(skip(state, payload))]
pub async fn validate<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(guest_token): Path<String>,
    payload: Result<Json<PromoCodeRequest>, JsonRejection>,
) -> ApiResult<PromoQuote> {
    let guest_token = parse_guest_token(&guest_token)?;
    let Json(req) = payload?;
    ok(state.carts.preview_promo(guest_token, &req.code()?).await?)
}

/// POST /promos/{guest_token}/apply
#[tracing::instrument(skip(state, payload))]
pub async fn apply<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(guest_token): Path<String>,
    payload: Result<Json<PromoCodeRequest>, JsonRejection>,
) -> ApiResult<PromoApplication> {
    let guest_token = parse_guest_token(&guest_token)?;
    let Json(req) = payload?;
    ok(state.carts.apply_promo(guest_token, &req.code()?).await?)
}

/// DELETE /promos/{guest_token}/remove
#[tracing::instrument(skip(state))]
pub async fn remove<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(guest_token): Path<String>,
) -> ApiResult<Cart> {
    let guest_token = parse_guest_token(&guest_token)?;
    ok(state.carts.remove_promo(guest_token).await?)
}
