//! Persisted trail of a checkout, kept for reconciliation.

use chrono::{DateTime, Utc};
use common::{GuestToken, OrderNumber, ProductId, PromoCode, VariantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::CheckoutState;

/// Collection holding checkout records, keyed by checkout ID.
pub const CHECKOUTS: &str = "checkouts";

/// A mutation checkout has applied and may have to undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CompletedStep {
    PromoConsumed {
        code: PromoCode,
    },
    OrderCreated {
        order_number: OrderNumber,
    },
    InventoryReserved {
        product_id: ProductId,
        variant_id: VariantId,
        quantity: u32,
    },
    CartDeleted,
}

impl CompletedStep {
    /// Step name used in logs and failure reasons.
    pub fn name(&self) -> &'static str {
        match self {
            CompletedStep::PromoConsumed { .. } => "consume_promo",
            CompletedStep::OrderCreated { .. } => "create_order",
            CompletedStep::InventoryReserved { .. } => "reserve_inventory",
            CompletedStep::CartDeleted => "delete_cart",
        }
    }
}

/// One checkout attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRecord {
    pub checkout_id: Uuid,
    pub cart_id: Uuid,
    pub guest_token: GuestToken,
    pub order_number: Option<OrderNumber>,
    pub state: CheckoutState,
    /// In execution order.
    pub completed_steps: Vec<CompletedStep>,
    pub failure_reason: Option<String>,
    /// Steps whose undo failed and need manual attention.
    #[serde(default)]
    pub unreverted_steps: Vec<CompletedStep>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckoutRecord {
    pub fn start(cart_id: Uuid, guest_token: GuestToken, now: DateTime<Utc>) -> Self {
        Self {
            checkout_id: Uuid::new_v4(),
            cart_id,
            guest_token,
            order_number: None,
            state: CheckoutState::Running,
            completed_steps: Vec::new(),
            failure_reason: None,
            unreverted_steps: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn complete_step(&mut self, step: CompletedStep, now: DateTime<Utc>) {
        if let CompletedStep::OrderCreated { order_number } = &step {
            self.order_number = Some(order_number.clone());
        }
        self.completed_steps.push(step);
        self.updated_at = now;
    }

    pub fn has_completed(&self, name: &str) -> bool {
        self.completed_steps.iter().any(|s| s.name() == name)
    }
}
