//! Checkout of the session's cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use domain::CheckoutDetails;
use serde::Deserialize;
use store::{Order, Store};

use crate::error::ApiError;
use crate::routes::cart::resolve_cart;
use crate::routes::require_customer;
use crate::session::{Session, SessionToken};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub phone: String,
}

/// POST /checkout: places an order from the logged-in customer's cart.
///
/// Shipping is the configured flat rate. Orders placed here carry no taxes
/// and no discount.
#[tracing::instrument(skip(state, payload))]
pub async fn checkout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, SessionToken, Json<Order>), ApiError> {
    let customer = require_customer(&state, &session).await?;
    let Json(req) = payload?;
    let (cart, session) = resolve_cart(&state, session).await?;

    let details = CheckoutDetails {
        shipping_address: req.shipping_address,
        phone: req.phone,
        shipping_cost: state.shipping_cost,
        ..Default::default()
    };
    let order = state
        .orders
        .create_order(customer.id, cart.id, details)
        .await?;

    Ok((
        StatusCode::CREATED,
        state.sessions.issue(&session)?,
        Json(order),
    ))
}
