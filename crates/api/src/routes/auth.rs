//! Registration, login and logout.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use domain::{CartError, DomainError, MergeOutcome, Registration};
use serde::{Deserialize, Serialize};
use store::{Customer, Store};

use crate::error::ApiError;
use crate::session::{Session, SessionToken};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub customer: Customer,
    /// Present when an anonymous cart was folded into the customer's cart.
    pub merge: Option<MergeOutcome>,
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

/// POST /auth/register
#[tracing::instrument(skip(state, payload))]
pub async fn register<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    let Json(registration) = payload?;
    let customer = state.customers.register(registration).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

/// POST /auth/login: authenticates and binds the session to the
/// customer's cart, merging any anonymous cart first.
#[tracing::instrument(skip(state, payload))]
pub async fn login<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(SessionToken, Json<LoginResponse>), ApiError> {
    let Json(req) = payload?;
    let customer = state
        .customers
        .login(&req.email, &req.password)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let mut merge = None;
    if let Some(cart_id) = session.cart_id {
        match state.carts.merge_on_login(cart_id, customer.id).await {
            Ok(outcome) => merge = Some(outcome),
            // Stale or already-owned carts are simply not carried over.
            Err(DomainError::Cart(CartError::CartNotFound(_) | CartError::AlreadyOwned(_))) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let cart_id = match merge {
        Some(outcome) => outcome.cart_id,
        None => state.carts.get_or_create(Some(customer.id), None).await?.id,
    };
    let session = Session {
        cart_id: Some(cart_id),
        customer_id: Some(customer.id),
    };

    Ok((
        state.sessions.issue(&session)?,
        Json(LoginResponse { customer, merge }),
    ))
}

/// POST /auth/logout: hands back an empty session.
pub async fn logout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<(SessionToken, Json<LogoutResponse>), ApiError> {
    Ok((
        state.sessions.issue(&Session::default())?,
        Json(LogoutResponse { logged_out: true }),
    ))
}
