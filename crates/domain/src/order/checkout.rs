//! Checkout input and order identifiers.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::Money;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use super::OrderError;

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?1?\d{9,15}$").expect("phone pattern is valid"));

/// Optional leading `+`, optional `1`, then 9 to 15 digits.
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_PATTERN.is_match(phone)
}

/// `ORD-YYYYMMDDHHMMSS-XXXXXXXX`, with eight random upper-case hex digits.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d%H%M%S"), suffix)
}

pub fn generate_tracking_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Buyer-supplied checkout data. Amounts are in cents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CheckoutDetails {
    pub shipping_address: String,
    pub phone: String,
    #[serde(default)]
    pub taxes: Money,
    #[serde(default)]
    pub shipping_cost: Money,
    #[serde(default)]
    pub discount: Money,
}

impl CheckoutDetails {
    /// Trims text fields and checks them along with the amounts.
    pub(crate) fn validated(mut self) -> Result<Self, OrderError> {
        self.shipping_address = self.shipping_address.trim().to_string();
        self.phone = self.phone.trim().to_string();

        if self.shipping_address.is_empty() {
            return Err(OrderError::InvalidAddress);
        }
        if !is_valid_phone(&self.phone) {
            return Err(OrderError::InvalidPhone(self.phone));
        }
        for (field, amount) in [
            ("taxes", self.taxes),
            ("shipping_cost", self.shipping_cost),
            ("discount", self.discount),
        ] {
            if amount.is_negative() {
                return Err(OrderError::InvalidAmount {
                    field,
                    cents: amount.cents(),
                });
            }
        }
        Ok(self)
    }
}
