//! Order aggregate: checkout, the state machine and statistics.

mod checkout;
mod service;

use std::collections::BTreeMap;

use common::{CartId, Money, OrderId, OrderState, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use checkout::{
    CheckoutDetails, generate_order_number, generate_tracking_token, is_valid_phone,
};
pub use service::OrderService;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("No order matches the tracking token")]
    TrackingNotFound,

    /// Requested target state is not reachable from the current one.
    #[error("Invalid state transition: cannot move from {from} to {to}")]
    InvalidStateTransition { from: OrderState, to: OrderState },

    #[error("Cart {0} is empty")]
    EmptyCart(CartId),

    /// The cart belongs to someone else or to nobody.
    #[error("Cart {0} does not belong to the customer")]
    ForeignCart(CartId),

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Shipping address must not be empty")]
    InvalidAddress,

    #[error("Invalid amount for {field}: {cents} cents")]
    InvalidAmount { field: &'static str, cents: i64 },

    #[error("Product '{name}' is not available")]
    ProductUnavailable { product_id: ProductId, name: String },

    #[error("Insufficient stock for '{name}'. Available: {available}, Requested: {requested}")]
    InsufficientStock {
        product_id: ProductId,
        name: String,
        available: u32,
        requested: u32,
    },
}

/// A state change applied to many orders at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Confirm,
    Ship,
    Deliver,
    Cancel,
}

impl BulkAction {
    /// The state an order ends in when the action applies.
    pub fn target(&self) -> OrderState {
        match self {
            BulkAction::Confirm => OrderState::Confirmed,
            BulkAction::Ship => OrderState::Shipped,
            BulkAction::Deliver => OrderState::Delivered,
            BulkAction::Cancel => OrderState::Cancelled,
        }
    }
}

/// What happened to one order in a bulk action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BulkStatus {
    Applied,
    /// The order's state did not allow the action.
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub status: BulkStatus,
}

/// Dashboard figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStatistics {
    /// Every state is present, with zero when no order is in it.
    pub by_state: BTreeMap<OrderState, u64>,
    pub total_orders: u64,
    pub orders_last_30_days: u64,
    /// Totals of confirmed, shipped and delivered orders placed in the window.
    pub revenue_last_30_days: Money,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_actions_target_single_step_states() {
        assert_eq!(BulkAction::Confirm.target(), OrderState::Confirmed);
        assert_eq!(BulkAction::Cancel.target(), OrderState::Cancelled);
        let action: BulkAction = serde_json::from_str(r#""ship""#).unwrap();
        assert_eq!(action, BulkAction::Ship);
    }

    #[test]
    fn bulk_outcome_serializes_flat() {
        let outcome = BulkOutcome {
            order_id: OrderId::new(),
            status: BulkStatus::Failed {
                error: "boom".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn statistics_serialize_states_as_keys() {
        let stats = OrderStatistics {
            by_state: OrderState::ALL.iter().map(|s| (*s, 0)).collect(),
            total_orders: 0,
            orders_last_30_days: 0,
            revenue_last_30_days: Money::zero(),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["by_state"]["pending"], 0);
        assert_eq!(json["by_state"]["cancelled"], 0);
    }
}
