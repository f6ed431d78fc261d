//! HTTP handlers grouped by resource.

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;

use domain::{CustomerError, DomainError};
use store::{Customer, Store};

use crate::error::ApiError;
use crate::session::Session;
use crate::state::AppState;

/// The logged-in customer, or 401.
pub(crate) async fn require_customer<S: Store>(
    state: &AppState<S>,
    session: &Session,
) -> Result<Customer, ApiError> {
    let customer_id = session
        .customer_id
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
    match state.customers.get_customer(customer_id).await {
        Ok(customer) if customer.is_active => Ok(customer),
        Ok(_) | Err(DomainError::Customer(CustomerError::NotFound)) => {
            Err(ApiError::Unauthorized("Authentication required".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// The logged-in staff member: 401 without a customer, 403 for non-staff.
pub(crate) async fn require_staff<S: Store>(
    state: &AppState<S>,
    session: &Session,
) -> Result<Customer, ApiError> {
    let customer = require_customer(state, session).await?;
    if !customer.is_staff {
        return Err(ApiError::Forbidden("Staff access required".to_string()));
    }
    Ok(customer)
}
