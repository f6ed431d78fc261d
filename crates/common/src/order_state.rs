//! Order state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► Shipped ──► Delivered
///    │            │
///    └────────────┴──► Cancelled
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// Order placed, awaiting confirmation.
    #[default]
    Pending,

    /// Order accepted for fulfilment.
    Confirmed,

    /// Order handed to the carrier.
    Shipped,

    /// Order received by the customer (terminal state).
    Delivered,

    /// Order was cancelled and its stock returned (terminal state).
    Cancelled,
}

impl OrderState {
    /// All states, in lifecycle order.
    pub const ALL: [OrderState; 5] = [
        OrderState::Pending,
        OrderState::Confirmed,
        OrderState::Shipped,
        OrderState::Delivered,
        OrderState::Cancelled,
    ];

    /// States whose orders count towards revenue.
    pub const REVENUE_RECOGNIZED: [OrderState; 3] = [
        OrderState::Confirmed,
        OrderState::Shipped,
        OrderState::Delivered,
    ];

    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderState::Pending)
    }

    pub fn can_ship(&self) -> bool {
        matches!(self, OrderState::Confirmed)
    }

    pub fn can_deliver(&self) -> bool {
        matches!(self, OrderState::Shipped)
    }

    /// Only orders that have not left the warehouse can be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderState::Pending | OrderState::Confirmed)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Delivered | OrderState::Cancelled)
    }

    pub fn is_revenue_recognized(&self) -> bool {
        Self::REVENUE_RECOGNIZED.contains(self)
    }

    /// Returns the state name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Pending => "pending",
            OrderState::Confirmed => "confirmed",
            OrderState::Shipped => "shipped",
            OrderState::Delivered => "delivered",
            OrderState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a string does not name an order state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order state: {0}")]
pub struct ParseOrderStateError(pub String);

impl std::str::FromStr for OrderState {
    type Err = ParseOrderStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ParseOrderStateError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_pending() {
        assert_eq!(OrderState::default(), OrderState::Pending);
    }

    #[test]
    fn single_step_guards() {
        assert!(OrderState::Pending.can_confirm());
        assert!(!OrderState::Confirmed.can_confirm());

        assert!(OrderState::Confirmed.can_ship());
        assert!(!OrderState::Pending.can_ship());

        assert!(OrderState::Shipped.can_deliver());
        assert!(!OrderState::Confirmed.can_deliver());
    }

    #[test]
    fn cancel_only_before_shipping() {
        assert!(OrderState::Pending.can_cancel());
        assert!(OrderState::Confirmed.can_cancel());
        assert!(!OrderState::Shipped.can_cancel());
        assert!(!OrderState::Delivered.can_cancel());
        assert!(!OrderState::Cancelled.can_cancel());
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderState::Pending.is_terminal());
        assert!(!OrderState::Confirmed.is_terminal());
        assert!(!OrderState::Shipped.is_terminal());
        assert!(OrderState::Delivered.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
    }

    #[test]
    fn terminal_states_allow_nothing() {
        for state in [OrderState::Delivered, OrderState::Cancelled] {
            assert!(!state.can_confirm());
            assert!(!state.can_ship());
            assert!(!state.can_deliver());
            assert!(!state.can_cancel());
        }
    }

    #[test]
    fn revenue_excludes_pending_and_cancelled() {
        assert!(!OrderState::Pending.is_revenue_recognized());
        assert!(!OrderState::Cancelled.is_revenue_recognized());
        assert!(OrderState::Confirmed.is_revenue_recognized());
        assert!(OrderState::Shipped.is_revenue_recognized());
        assert!(OrderState::Delivered.is_revenue_recognized());
    }

    #[test]
    fn parse_and_display_agree() {
        for state in OrderState::ALL {
            assert_eq!(state.to_string().parse::<OrderState>().unwrap(), state);
        }
        assert!("processing".parse::<OrderState>().is_err());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&OrderState::Shipped).unwrap();
        assert_eq!(json, "\"shipped\"");
    }
}
