//! Promotion service: code lookup, validation, admin and usage counting.

use chrono::{DateTime, Utc};
use common::PromoCode;
use store::{Bounds, DocumentQuery, DocumentStore, DocumentStoreExt, SaveOptions, StoreError};

use super::{NewPromo, Promo, promo};
use crate::{Cart, DomainError, Money, PromoRejection};

/// Collection holding promo documents, keyed by code.
pub const PROMOS: &str = "promos";

const USED_COUNT_PATH: &str = "/used_count";

/// Service for promotion operations.
#[derive(Clone)]
pub struct PromotionService<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> PromotionService<S> {
    /// Creates a new promotion service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a promo. A code that is already taken yields `Conflict`.
    #[tracing::instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_promo(&self, input: NewPromo) -> Result<Promo, DomainError> {
        let promo = input
            .into_promo(Utc::now())
            .map_err(DomainError::ValidationFailed)?;

        let result = self
            .store
            .save_as(
                PROMOS,
                promo.code.as_str(),
                &promo,
                None,
                SaveOptions::expect_new(),
            )
            .await;

        match result {
            Ok(_) => {
                tracing::info!(code = %promo.code, "promo created");
                Ok(promo)
            }
            Err(StoreError::ConcurrencyConflict { .. }) => Err(DomainError::Conflict(format!(
                "promo code {} already exists",
                promo.code
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Looks up a promo by code (normalized), whatever its state.
    pub async fn find_promo(&self, code: &PromoCode) -> Result<Option<Promo>, DomainError> {
        Ok(self
            .store
            .load_as::<Promo>(PROMOS, code.as_str())
            .await?
            .map(|(promo, _)| promo))
    }

    /// Runs the ordered validation rules for an order of `order_total`.
    #[tracing::instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &PromoCode,
        order_total: Money,
        now: DateTime<Utc>,
    ) -> Result<Promo, DomainError> {
        let found = self.find_promo(code).await?;
        promo::validate(found.as_ref(), order_total, now)
            .map_err(|reason| DomainError::promo(code, reason))?;
        found.ok_or_else(|| DomainError::not_found("Promo", code))
    }

    /// The discount a promo grants on the cart's current total.
    pub fn compute_for_cart(promo: &Promo, cart: &Cart) -> Money {
        promo.discount_for(cart.total_amount)
    }

    /// Counts one use of a promo.
    ///
    /// The increment is a single bounded store operation, so concurrent
    /// consumers can never push `used_count` past `usage_limit`. The loser of
    /// such a race gets `LimitExceeded`. Returns the new use count.
    #[tracing::instrument(skip(self))]
    pub async fn consume(&self, code: &PromoCode) -> Result<u32, DomainError> {
        let promo = self
            .find_promo(code)
            .await?
            .ok_or_else(|| DomainError::not_found("Promo", code))?;

        let bounds = match promo.usage_limit {
            Some(limit) => Bounds::at_most(i64::from(limit)),
            None => Bounds::non_negative(),
        };

        match self
            .store
            .adjust(PROMOS, code.as_str(), USED_COUNT_PATH, 1, bounds)
            .await
        {
            Ok(used) => {
                metrics::counter!("promo_consumed_total").increment(1);
                tracing::info!(%code, used, "promo consumed");
                Ok(u32::try_from(used).unwrap_or_default())
            }
            Err(StoreError::BoundViolation { .. }) => {
                metrics::counter!("store_adjust_conflicts_total", "counter" => "promo")
                    .increment(1);
                tracing::warn!(%code, "promo usage limit reached at consumption");
                Err(DomainError::promo(code, PromoRejection::LimitExceeded))
            }
            Err(StoreError::NotFound { .. }) => Err(DomainError::not_found("Promo", code)),
            Err(e) => Err(e.into()),
        }
    }

    /// Gives back one use of a promo, e.g. when a checkout is rolled back.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, code: &PromoCode) -> Result<u32, DomainError> {
        let used = self
            .store
            .adjust(PROMOS, code.as_str(), USED_COUNT_PATH, -1, Bounds::non_negative())
            .await?;
        tracing::info!(%code, used, "promo use released");
        Ok(u32::try_from(used).unwrap_or_default())
    }

    /// Lists active promos, newest first.
    pub async fn list_active(&self) -> Result<Vec<Promo>, DomainError> {
        Ok(self
            .store
            .query_as(
                DocumentQuery::collection(PROMOS)
                    .equals("/is_active", true)
                    .newest_first(),
            )
            .await?)
    }
}
