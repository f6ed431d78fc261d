//! Order service.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use common::{CartId, CustomerId, Money, OrderId, OrderState};
use store::{
    CartRepository, CatalogRepository, CustomerRepository, Order, OrderLine, OrderPage,
    OrderQuery, OrderRepository, Store, StoreError, Transaction,
};

use crate::cart::CartError;
use crate::catalog::MAX_STOCK;
use crate::customer::CustomerError;
use crate::error::DomainError;

use super::{
    BulkAction, BulkOutcome, BulkStatus, CheckoutDetails, OrderError, OrderStatistics,
    generate_order_number, generate_tracking_token,
};

/// Length of the trailing statistics window.
const STATISTICS_WINDOW_DAYS: i64 = 30;

/// Result of attempting a single state change.
enum Transition {
    Applied(Order),
    /// The order was left untouched in the given state.
    Refused(OrderState),
}

/// Service for placing orders and driving them through their lifecycle.
///
/// Transitions are single-step. A transition the current state does not
/// allow is a no-op reported as `false`, never an error.
#[derive(Clone)]
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Turns the customer's cart into a pending order.
    ///
    /// Stock is re-validated and decremented for every line, unit prices are
    /// frozen at the current price and the cart is emptied, all in one
    /// transaction.
    #[tracing::instrument(skip(self, details))]
    pub async fn create_order(
        &self,
        customer_id: CustomerId,
        cart_id: CartId,
        details: CheckoutDetails,
    ) -> Result<Order, DomainError> {
        let started = Instant::now();
        let details = details.validated()?;
        let mut tx = self.store.begin().await?;

        let customer = tx
            .get_customer(customer_id)
            .await?
            .ok_or(CustomerError::NotFound)?;
        let cart = tx
            .lock_cart(cart_id)
            .await?
            .ok_or(CartError::CartNotFound(cart_id))?;
        if cart.customer_id != Some(customer_id) {
            return Err(OrderError::ForeignCart(cart_id).into());
        }

        let cart_lines = tx.cart_lines(cart_id).await?;
        if cart_lines.is_empty() {
            return Err(OrderError::EmptyCart(cart_id).into());
        }

        // Lock products in a stable order so concurrent checkouts cannot deadlock.
        let mut product_ids: Vec<_> = cart_lines.iter().map(|l| l.product_id).collect();
        product_ids.sort();

        let now = Utc::now();
        let mut products = HashMap::with_capacity(product_ids.len());
        for product_id in product_ids {
            let product = tx
                .lock_product(product_id)
                .await?
                .ok_or(StoreError::MissingRow("products"))?;
            products.insert(product_id, product);
        }

        let mut lines = Vec::with_capacity(cart_lines.len());
        for cart_line in &cart_lines {
            let product = products
                .get_mut(&cart_line.product_id)
                .ok_or(StoreError::MissingRow("products"))?;

            if product.is_sold_out() {
                return Err(OrderError::ProductUnavailable {
                    product_id: product.id,
                    name: product.name.clone(),
                }
                .into());
            }
            if cart_line.quantity > product.stock {
                metrics::counter!("cart_stock_conflicts_total").increment(1);
                tracing::warn!(
                    product_id = %product.id,
                    available = product.stock,
                    requested = cart_line.quantity,
                    "stock conflict at checkout"
                );
                return Err(OrderError::InsufficientStock {
                    product_id: product.id,
                    name: product.name.clone(),
                    available: product.stock,
                    requested: cart_line.quantity,
                }
                .into());
            }

            product.stock -= cart_line.quantity;
            product.updated_at = now;
            tx.update_product(product).await?;

            lines.push(OrderLine::new(
                product.id,
                product.name.clone(),
                cart_line.quantity,
                product.current_price(),
            ));
        }

        let subtotal: Money = lines.iter().map(|l| l.total).sum();
        let total = subtotal + details.taxes + details.shipping_cost - details.discount;
        if total.is_negative() {
            return Err(OrderError::InvalidAmount {
                field: "discount",
                cents: details.discount.cents(),
            }
            .into());
        }

        let mut order = Order {
            id: OrderId::new(),
            customer_id,
            customer_email: customer.email,
            order_number: generate_order_number(now),
            tracking_token: generate_tracking_token(),
            state: OrderState::Pending,
            subtotal,
            taxes: details.taxes,
            shipping_cost: details.shipping_cost,
            discount: details.discount,
            total,
            shipping_address: details.shipping_address,
            phone: details.phone,
            cancellation_reason: None,
            lines,
            created_at: now,
            updated_at: now,
        };
        tx.insert_order(&mut order).await?;
        tx.clear_cart_lines(cart_id).await?;
        tx.touch_cart(cart_id, now).await?;
        tx.commit().await?;

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "order created"
        );

        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        let mut tx = self.store.begin().await?;
        Ok(tx
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?)
    }

    /// Looks an order up by its tracking token, without authentication.
    #[tracing::instrument(skip(self))]
    pub async fn track(&self, token: &str) -> Result<Order, DomainError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(OrderError::TrackingNotFound.into());
        }
        let mut tx = self.store.begin().await?;
        Ok(tx
            .find_order_by_tracking_token(token)
            .await?
            .ok_or(OrderError::TrackingNotFound)?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, query: &OrderQuery) -> Result<OrderPage, DomainError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_orders(query).await?)
    }

    /// pending → confirmed
    pub async fn confirm(&self, order_id: OrderId) -> Result<bool, DomainError> {
        self.advance(order_id, OrderState::Confirmed)
            .await
            .map(|t| matches!(t, Transition::Applied(_)))
    }

    /// confirmed → shipped
    pub async fn mark_shipped(&self, order_id: OrderId) -> Result<bool, DomainError> {
        self.advance(order_id, OrderState::Shipped)
            .await
            .map(|t| matches!(t, Transition::Applied(_)))
    }

    /// shipped → delivered
    pub async fn mark_delivered(&self, order_id: OrderId) -> Result<bool, DomainError> {
        self.advance(order_id, OrderState::Delivered)
            .await
            .map(|t| matches!(t, Transition::Applied(_)))
    }

    /// Cancels a pending or confirmed order and returns every line's
    /// quantity to stock. Returns `false` without touching stock otherwise,
    /// so a second cancel never restores twice.
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<bool, DomainError> {
        self.cancel(order_id, reason)
            .await
            .map(|t| matches!(t, Transition::Applied(_)))
    }

    /// Moves an order to `target`, failing if the move is not allowed.
    #[tracing::instrument(skip(self))]
    pub async fn change_state(
        &self,
        order_id: OrderId,
        target: OrderState,
        reason: Option<String>,
    ) -> Result<Order, DomainError> {
        let transition = match target {
            OrderState::Pending => {
                let order = self.get_order(order_id).await?;
                Transition::Refused(order.state)
            }
            OrderState::Cancelled => self.cancel(order_id, reason).await?,
            _ => self.advance(order_id, target).await?,
        };

        match transition {
            Transition::Applied(order) => Ok(order),
            Transition::Refused(from) => {
                Err(OrderError::InvalidStateTransition { from, to: target }.into())
            }
        }
    }

    /// Applies `action` to each order independently.
    ///
    /// One order failing does not stop or undo the others.
    #[tracing::instrument(skip(self, order_ids), fields(count = order_ids.len()))]
    pub async fn bulk_apply(&self, action: BulkAction, order_ids: &[OrderId]) -> Vec<BulkOutcome> {
        let mut outcomes = Vec::with_capacity(order_ids.len());
        for &order_id in order_ids {
            let result = match action {
                BulkAction::Cancel => self.cancel(order_id, None).await,
                _ => self.advance(order_id, action.target()).await,
            };
            let status = match result {
                Ok(Transition::Applied(_)) => BulkStatus::Applied,
                Ok(Transition::Refused(_)) => BulkStatus::Skipped,
                Err(e) => {
                    tracing::warn!(%order_id, error = %e, "bulk action failed");
                    BulkStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(BulkOutcome { order_id, status });
        }
        outcomes
    }

    /// Statistics over the 30 days before now.
    pub async fn statistics(&self) -> Result<OrderStatistics, DomainError> {
        self.statistics_at(Utc::now()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn statistics_at(&self, now: DateTime<Utc>) -> Result<OrderStatistics, DomainError> {
        let since = now - Duration::days(STATISTICS_WINDOW_DAYS);
        let mut tx = self.store.begin().await?;

        let counts = tx.order_counts_by_state().await?;
        let by_state = OrderState::ALL
            .iter()
            .map(|state| (*state, counts.get(state).copied().unwrap_or(0)))
            .collect();
        let total_orders = counts.values().sum();
        let orders_last_30_days = tx.count_orders_since(since).await?;
        let revenue_last_30_days = tx
            .revenue_since(since, &OrderState::REVENUE_RECOGNIZED)
            .await?;

        Ok(OrderStatistics {
            by_state,
            total_orders,
            orders_last_30_days,
            revenue_last_30_days,
        })
    }

    /// Single forward step of the lifecycle.
    #[tracing::instrument(skip(self))]
    async fn advance(
        &self,
        order_id: OrderId,
        target: OrderState,
    ) -> Result<Transition, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        let allowed = match target {
            OrderState::Confirmed => order.state.can_confirm(),
            OrderState::Shipped => order.state.can_ship(),
            OrderState::Delivered => order.state.can_deliver(),
            OrderState::Pending | OrderState::Cancelled => false,
        };
        if !allowed {
            tracing::info!(%order_id, from = %order.state, to = %target, "transition refused");
            return Ok(Transition::Refused(order.state));
        }

        let from = order.state;
        order.state = target;
        order.updated_at = Utc::now();
        tx.update_order(&mut order).await?;
        tx.commit().await?;

        metrics::counter!("order_transitions_total", "to" => target.as_str()).increment(1);
        tracing::info!(%order_id, %from, to = %target, "order state changed");
        Ok(Transition::Applied(order))
    }

    #[tracing::instrument(skip(self))]
    async fn cancel(
        &self,
        order_id: OrderId,
        reason: Option<String>,
    ) -> Result<Transition, DomainError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        if !order.state.can_cancel() {
            tracing::info!(%order_id, state = %order.state, "cancel refused");
            return Ok(Transition::Refused(order.state));
        }

        // Same lock order as checkout.
        let mut product_ids: Vec<_> = order.lines.iter().map(|l| l.product_id).collect();
        product_ids.sort();
        product_ids.dedup();

        let now = Utc::now();
        let mut products = HashMap::with_capacity(product_ids.len());
        for product_id in product_ids {
            let product = tx
                .lock_product(product_id)
                .await?
                .ok_or(StoreError::MissingRow("products"))?;
            products.insert(product_id, product);
        }

        for line in &order.lines {
            let product = products
                .get_mut(&line.product_id)
                .ok_or(StoreError::MissingRow("products"))?;
            product.stock = product.stock.saturating_add(line.quantity).min(MAX_STOCK);
            product.updated_at = now;
        }
        for product in products.values() {
            tx.update_product(product).await?;
        }

        order.state = OrderState::Cancelled;
        order.cancellation_reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        order.updated_at = now;
        tx.update_order(&mut order).await?;
        tx.commit().await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        metrics::counter!("order_transitions_total", "to" => OrderState::Cancelled.as_str())
            .increment(1);
        tracing::info!(
            %order_id,
            restored_units = order.total_items(),
            "order cancelled and stock restored"
        );
        Ok(Transition::Applied(order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryStore;

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let service = OrderService::new(InMemoryStore::new());
        let err = service.confirm(OrderId::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::Order(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn blank_tracking_token_is_not_found() {
        let service = OrderService::new(InMemoryStore::new());
        let err = service.track("  ").await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::TrackingNotFound)
        ));
    }

    #[tokio::test]
    async fn empty_store_statistics_list_every_state() {
        let service = OrderService::new(InMemoryStore::new());
        let stats = service.statistics().await.unwrap();

        assert_eq!(stats.by_state.len(), OrderState::ALL.len());
        assert!(stats.by_state.values().all(|n| *n == 0));
        assert_eq!(stats.total_orders, 0);
        assert_eq!(stats.revenue_last_30_days, Money::zero());
    }

    #[tokio::test]
    async fn bulk_apply_reports_missing_orders() {
        let service = OrderService::new(InMemoryStore::new());
        let ids = [OrderId::new(), OrderId::new()];
        let outcomes = service.bulk_apply(BulkAction::Ship, &ids).await;

        assert_eq!(outcomes.len(), 2);
        assert!(
            outcomes
                .iter()
                .all(|o| matches!(o.status, BulkStatus::Failed { .. }))
        );
    }
}
