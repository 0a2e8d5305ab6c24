//! Promotion rules and their validation.

use chrono::{DateTime, Utc};
use common::PromoCode;
use serde::{Deserialize, Serialize};

use crate::money::{Discount, FULL_PERCENT_BP, compute_discount};
use crate::{Money, PromoRejection};

const MAX_NAME_LEN: usize = 100;

/// A named, time-windowed, usage-limited discount rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promo {
    /// Unique, upper-cased.
    pub code: PromoCode,
    pub name: String,
    #[serde(flatten)]
    pub discount: Discount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_order_amount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<u32>,
    /// Only ever changed by checkout consuming a use.
    #[serde(default)]
    pub used_count: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Promo {
    /// Checks whether the promo may be used on an order of `order_total` at `now`.
    ///
    /// Checks run in a fixed order and the first failure wins: inactive,
    /// outside the window (both ends inclusive), usage limit, minimum order.
    pub fn check(&self, order_total: Money, now: DateTime<Utc>) -> Result<(), PromoRejection> {
        if !self.is_active {
            return Err(PromoRejection::NotFound);
        }
        if now < self.valid_from || now > self.valid_until {
            return Err(PromoRejection::Expired);
        }
        if self.is_exhausted() {
            return Err(PromoRejection::LimitExceeded);
        }
        if let Some(minimum) = self.minimum_order_amount
            && order_total < minimum
        {
            return Err(PromoRejection::MinimumNotMet { minimum });
        }
        Ok(())
    }

    /// Returns true if the usage limit has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.used_count >= limit)
    }

    /// The discount this promo grants on `base`.
    pub fn discount_for(&self, base: Money) -> Money {
        compute_discount(base, &self.discount)
    }
}

/// Validates a possibly missing promo against an order total.
pub fn validate(
    promo: Option<&Promo>,
    order_total: Money,
    now: DateTime<Utc>,
) -> Result<(), PromoRejection> {
    promo
        .ok_or(PromoRejection::NotFound)?
        .check(order_total, now)
}

/// Input for creating a promo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPromo {
    pub code: String,
    pub name: String,
    #[serde(flatten)]
    pub discount: Discount,
    #[serde(default)]
    pub minimum_order_amount: Option<Money>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewPromo {
    /// Checks the admin rules and builds the promo, collecting every problem.
    pub fn into_promo(self, now: DateTime<Utc>) -> Result<Promo, Vec<String>> {
        let mut problems = Vec::new();
        let code = PromoCode::new(&self.code);

        if !code.is_well_formed() {
            problems.push(format!(
                "code must be 1 to {} characters of A-Z, 0-9, '_' or '-'",
                PromoCode::MAX_LEN
            ));
        }
        let name_len = self.name.trim().chars().count();
        if name_len == 0 || name_len > MAX_NAME_LEN {
            problems.push(format!("name must be between 1 and {MAX_NAME_LEN} characters"));
        }
        match self.discount {
            Discount::Percentage {
                basis_points,
                max_discount,
            } => {
                if basis_points > FULL_PERCENT_BP {
                    problems.push("percentage value cannot exceed 100%".to_string());
                }
                if max_discount.is_some_and(|cap| cap.is_negative()) {
                    problems.push("max_discount must not be negative".to_string());
                }
            }
            Discount::Fixed { amount } => {
                if amount.is_negative() {
                    problems.push("fixed value must not be negative".to_string());
                }
            }
        }
        if self.minimum_order_amount.is_some_and(|m| m.is_negative()) {
            problems.push("minimum_order_amount must not be negative".to_string());
        }
        if self.valid_from >= self.valid_until {
            problems.push("valid_from must be before valid_until".to_string());
        }
        if self.usage_limit == Some(0) {
            problems.push("usage_limit must be at least 1".to_string());
        }

        if !problems.is_empty() {
            return Err(problems);
        }

        Ok(Promo {
            code,
            name: self.name.trim().to_string(),
            discount: self.discount,
            minimum_order_amount: self.minimum_order_amount,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            usage_limit: self.usage_limit,
            used_count: 0,
            is_active: self.is_active,
            created_at: now,
            updated_at: now,
        })
    }
}
