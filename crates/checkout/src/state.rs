//! Checkout state machine.

use serde::{Deserialize, Serialize};

/// The state of a checkout in its lifecycle.
///
/// State transitions:
/// ```text
/// Running ──┬──► Completed
///           └──► Compensating ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    /// Steps are being executed.
    #[default]
    Running,

    /// A step failed and completed steps are being undone.
    Compensating,

    /// The order exists, inventory is reserved and the cart is gone (terminal state).
    Completed,

    /// The checkout was abandoned; every completed step was undone (terminal state).
    Failed,
}

impl CheckoutState {
    /// Returns true if compensation may begin.
    pub fn can_compensate(&self) -> bool {
        matches!(self, CheckoutState::Running)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Running => "running",
            CheckoutState::Compensating => "compensating",
            CheckoutState::Completed => "completed",
            CheckoutState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
