//! Cart endpoints. The cart is always the one bound to the session.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{AddedItem, CartDetail, CartError, DomainError, ProductId, RemovedItem};
use serde::{Deserialize, Serialize};
use store::{Cart, Store};

use crate::error::ApiError;
use crate::session::{Session, SessionToken};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Deserialize)]
pub struct ModifyItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct ItemResponse {
    pub item: AddedItem,
    pub cart: CartDetail,
}

#[derive(Serialize)]
pub struct RemovedResponse {
    pub removed: RemovedItem,
    pub cart: CartDetail,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub items_removed: u64,
}

/// Finds the session's cart, or the customer's, or starts a new one.
///
/// A cart id that no longer exists, or that belongs to another customer, is
/// dropped and replaced.
pub(crate) async fn resolve_cart<S: Store>(
    state: &AppState<S>,
    session: Session,
) -> Result<(Cart, Session), ApiError> {
    if let Some(cart_id) = session.cart_id {
        match state.carts.get_or_create(session.customer_id, Some(cart_id)).await {
            Ok(cart) if cart.customer_id.is_none() || cart.customer_id == session.customer_id => {
                return Ok((cart, session));
            }
            Ok(_) | Err(DomainError::Cart(CartError::CartNotFound(_))) => {
                tracing::info!(%cart_id, "session cart replaced");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let cart = state.carts.get_or_create(session.customer_id, None).await?;
    let session = session.with_cart(cart.id);
    Ok((cart, session))
}

/// GET /cart: the session's cart with live prices.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
) -> Result<(SessionToken, Json<CartDetail>), ApiError> {
    let (cart, session) = resolve_cart(&state, session).await?;
    let detail = state.carts.get_detail(cart.id).await?;
    Ok((state.sessions.issue(&session)?, Json(detail)))
}

/// POST /cart/add: adds units of a product (default one).
#[tracing::instrument(skip(state, payload))]
pub async fn add<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    payload: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<(StatusCode, SessionToken, Json<ItemResponse>), ApiError> {
    let Json(req) = payload?;
    let (cart, session) = resolve_cart(&state, session).await?;

    let item = state
        .carts
        .add_item(cart.id, req.product_id, req.quantity)
        .await?;
    let detail = state.carts.get_detail(cart.id).await?;

    let status = if item.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        state.sessions.issue(&session)?,
        Json(ItemResponse { item, cart: detail }),
    ))
}

/// PUT /cart/modify: overwrites a line's quantity.
#[tracing::instrument(skip(state, payload))]
pub async fn modify<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    payload: Result<Json<ModifyItemRequest>, JsonRejection>,
) -> Result<(SessionToken, Json<ItemResponse>), ApiError> {
    let Json(req) = payload?;
    let (cart, session) = resolve_cart(&state, session).await?;

    let item = state
        .carts
        .modify_quantity(cart.id, req.product_id, req.quantity)
        .await?;
    let detail = state.carts.get_detail(cart.id).await?;

    Ok((
        state.sessions.issue(&session)?,
        Json(ItemResponse { item, cart: detail }),
    ))
}

/// DELETE /cart/remove/{product_id}: deletes one line.
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(product_id): Path<ProductId>,
) -> Result<(SessionToken, Json<RemovedResponse>), ApiError> {
    let (cart, session) = resolve_cart(&state, session).await?;

    let removed = state.carts.remove_item(cart.id, product_id).await?;
    let detail = state.carts.get_detail(cart.id).await?;

    Ok((
        state.sessions.issue(&session)?,
        Json(RemovedResponse {
            removed,
            cart: detail,
        }),
    ))
}

/// DELETE /cart/clear: empties the cart. Never fails for a missing cart.
#[tracing::instrument(skip(state))]
pub async fn clear<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
) -> Result<Json<ClearResponse>, ApiError> {
    let cart_id = match (session.cart_id, session.customer_id) {
        (Some(cart_id), _) => Some(cart_id),
        (None, Some(_)) => Some(resolve_cart(&state, session).await?.0.id),
        (None, None) => None,
    };

    let items_removed = match cart_id {
        Some(cart_id) => state.carts.clear(cart_id).await?,
        None => 0,
    };
    Ok(Json(ClearResponse { items_removed }))
}
