//! Customer identity keyed by email.

mod password;
mod service;

use common::CustomerId;
use serde::Deserialize;
use thiserror::Error;

pub use service::CustomerService;

/// Errors that can occur during customer operations.
#[derive(Debug, Error)]
pub enum CustomerError {
    #[error("Email is required")]
    MissingEmail,

    #[error("Password is required")]
    MissingPassword,

    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("Password could not be hashed")]
    PasswordHash,

    #[error("Customer not found")]
    NotFound,

    #[error("Customer {0} has orders and cannot be deleted")]
    HasOrders(CustomerId),
}

/// Sign-up data. Only email and password are mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
}

impl Registration {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>, surname: impl Into<String>) -> Self {
        self.name = name.into();
        self.surname = surname.into();
        self
    }
}
