//! Order administration and public tracking endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use domain::{BulkAction, BulkOutcome, OrderId, OrderState, OrderStatistics};
use serde::{Deserialize, Serialize};
use store::{Order, OrderPage, OrderQuery, Store};

use crate::error::ApiError;
use crate::routes::{require_customer, require_staff};
use crate::session::Session;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct OrderFilters {
    pub state: Option<OrderState>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl From<OrderFilters> for OrderQuery {
    fn from(filters: OrderFilters) -> Self {
        let mut query = OrderQuery::new();
        if let Some(state) = filters.state {
            query = query.state(state);
        }
        if let Some(from) = filters.from {
            query = query.from(from);
        }
        if let Some(to) = filters.to {
            query = query.to(to);
        }
        if let Some(email) = filters.email.filter(|e| !e.trim().is_empty()) {
            query = query.email(email.trim());
        }
        if let Some(page) = filters.page {
            query = query.page(page);
        }
        if let Some(page_size) = filters.page_size {
            query = query.page_size(page_size);
        }
        query
    }
}

#[derive(Deserialize)]
pub struct ChangeStateRequest {
    /// Parsed by hand so an unknown state is a 400 with a clear message.
    pub state: String,
    pub reason: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub order_ids: Vec<OrderId>,
}

// -- Response types --

#[derive(Serialize)]
pub struct BulkResponse {
    pub applied: usize,
    pub results: Vec<BulkOutcome>,
}

/// Public view of an order found by tracking token.
#[derive(Serialize)]
pub struct TrackingResponse {
    pub order_number: String,
    pub state: OrderState,
    pub total: common::Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for TrackingResponse {
    fn from(order: Order) -> Self {
        Self {
            order_number: order.order_number,
            state: order.state,
            total: order.total,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// -- Handlers --

/// GET /orders (staff): paginated, newest first.
#[tracing::instrument(skip(state, filters))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    filters: Result<Query<OrderFilters>, QueryRejection>,
) -> Result<Json<OrderPage>, ApiError> {
    require_staff(&state, &session).await?;
    let Query(filters) = filters?;
    let page = state.orders.list_orders(&filters.into()).await?;
    Ok(Json(page))
}

/// GET /orders/stats (staff)
#[tracing::instrument(skip(state))]
pub async fn stats<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
) -> Result<Json<OrderStatistics>, ApiError> {
    require_staff(&state, &session).await?;
    Ok(Json(state.orders.statistics().await?))
}

/// GET /orders/{id} (staff)
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    require_staff(&state, &session).await?;
    Ok(Json(state.orders.get_order(order_id).await?))
}

/// POST /orders/{id}/change-state (staff)
#[tracing::instrument(skip(state, payload))]
pub async fn change_state<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(order_id): Path<OrderId>,
    payload: Result<Json<ChangeStateRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    require_staff(&state, &session).await?;
    let Json(req) = payload?;
    let target: OrderState = req
        .state
        .parse()
        .map_err(|e: common::ParseOrderStateError| ApiError::BadRequest(e.to_string()))?;

    let order = state
        .orders
        .change_state(order_id, target, req.reason)
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/cancel: staff may cancel any order, customers their own.
///
/// Stock is restored. Orders past `confirmed` yield a 400.
#[tracing::instrument(skip(state, payload))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(order_id): Path<OrderId>,
    payload: Option<Json<CancelRequest>>,
) -> Result<Json<Order>, ApiError> {
    let customer = require_customer(&state, &session).await?;
    if !customer.is_staff {
        let order = state.orders.get_order(order_id).await?;
        if order.customer_id != customer.id {
            return Err(ApiError::NotFound(format!("Order not found: {order_id}")));
        }
    }

    let reason = payload.and_then(|Json(req)| req.reason);
    let order = state
        .orders
        .change_state(order_id, OrderState::Cancelled, reason)
        .await?;
    Ok(Json(order))
}

/// POST /orders/bulk (staff): each order succeeds or fails on its own.
#[tracing::instrument(skip(state, payload))]
pub async fn bulk<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    payload: Result<Json<BulkRequest>, JsonRejection>,
) -> Result<Json<BulkResponse>, ApiError> {
    require_staff(&state, &session).await?;
    let Json(req) = payload?;

    let results = state.orders.bulk_apply(req.action, &req.order_ids).await;
    let applied = results
        .iter()
        .filter(|r| r.status == domain::BulkStatus::Applied)
        .count();
    tracing::info!(action = ?req.action, applied, total = results.len(), "bulk action done");

    Ok(Json(BulkResponse { applied, results }))
}

/// GET /orders/track/{token}: public status lookup.
#[tracing::instrument(skip(state, token))]
pub async fn track<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(token): Path<String>,
) -> Result<Json<TrackingResponse>, ApiError> {
    let order = state.orders.track(&token).await?;
    Ok(Json(order.into()))
}
