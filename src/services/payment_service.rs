//! Payment: the shared `paid` transition, gateway webhook reconciliation
//! and payment-method selection.

use std::collections::HashMap;

use sea_orm::{ActiveModelTrait, ConnectionTrait, IntoActiveModel, Set};
use uuid::Uuid;

use crate::{
    cache::{keys, ttl},
    dto::orders::{PaymentSelection, SelectPaymentMethodRequest},
    entity::orders::Model as OrderModel,
    error::{AppError, AppResult},
    gateway::GatewayEvent,
    models::{ItemStatus, Order, OrderStatus, OrderType, PaymentMethod, Restaurant},
    notify::{OrderEventName, publish_order_event},
    repository::{self, now},
    services::{
        order_service::invalidate_order, order_state::validate_order_transition, stock_ledger,
        table_sessions,
    },
    state::AppState,
    transaction::run_in_transaction,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentApplied {
    Applied,
    AlreadyPaid,
}

/// Result of handling one gateway webhook.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Applied(Order),
    /// Duplicate delivery: the order was already paid, nothing changed.
    AlreadyPaid(Uuid),
    Ignored { event_id: String, kind: String },
}

/// Moves a locked order to `paid`.
///
/// Idempotent: an order that is already paid is left untouched. For togo
/// orders the deferred stock is taken now and the waiting items are sent to
/// the kitchen. A linked table session is closed if this was its last open
/// order.
pub async fn apply_payment<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    method: Option<PaymentMethod>,
) -> AppResult<PaymentApplied> {
    let status: OrderStatus = order.status.parse()?;
    if order.is_paid || status == OrderStatus::Paid {
        return Ok(PaymentApplied::AlreadyPaid);
    }
    if status == OrderStatus::Cancelled {
        return Err(AppError::OrderClosed(order.id));
    }
    validate_order_transition(status, OrderStatus::Paid, None)?;

    if order.order_type.parse::<OrderType>()? == OrderType::Togo {
        for item in repository::orders::items(conn, order.id).await? {
            if item.status.parse::<ItemStatus>()? != ItemStatus::AwaitingPayment {
                continue;
            }
            stock_ledger::decrement(conn, item.food_id, item.quantity).await?;
            repository::orders::set_item_status(conn, item, ItemStatus::Pending, None).await?;
        }
    }

    let session_id = order.session_id;
    let stamp = now();
    let mut active = order.into_active_model();
    active.status = Set(OrderStatus::Paid.as_str().to_string());
    active.is_paid = Set(true);
    active.paid_at = Set(Some(stamp));
    active.updated_at = Set(stamp);
    if let Some(method) = method {
        active.payment_method = Set(Some(method.as_str().to_string()));
    }
    active.update(conn).await?;

    if let Some(session_id) = session_id {
        table_sessions::close_if_complete(conn, session_id).await?;
    }
    Ok(PaymentApplied::Applied)
}

/// Handles a raw gateway webhook: verify, then apply `paid` at most once.
///
/// Transient write conflicts (two deliveries racing on the same order row)
/// are retried according to `settings.write_retry`.
pub async fn reconcile_payment(
    state: &AppState,
    raw_body: &[u8],
    signature: &str,
) -> AppResult<ReconcileOutcome> {
    let event = state
        .gateway
        .verify_and_parse_webhook(raw_body, signature, &state.settings.webhook_secret)?;

    let (event_id, order_id, amount) = match event {
        GatewayEvent::Ignored { event_id, kind } => {
            tracing::debug!(%event_id, %kind, "gateway event ignored");
            return Ok(ReconcileOutcome::Ignored { event_id, kind });
        }
        GatewayEvent::PaymentSucceeded {
            event_id,
            order_id,
            amount,
            ..
        } => (event_id, order_id, amount),
    };

    let applied = state
        .settings
        .write_retry
        .run("reconcile_payment", || {
            run_in_transaction(&state.orm, "reconcile_payment", move |txn| {
                Box::pin(async move {
                    let order = repository::orders::find_for_update(txn, order_id).await?;
                    // Items cannot be appended while an online intent is open, so a
                    // mismatch here means the gateway and the order disagree on the
                    // same total. It is logged for the operator and not refused.
                    if order.total != amount {
                        tracing::warn!(%order_id, expected = order.total, received = amount, "payment amount mismatch");
                    }
                    let method = order.payment_method.is_none().then_some(PaymentMethod::Online);
                    apply_payment(txn, order, method).await
                })
            })
        })
        .await?;

    if applied == PaymentApplied::AlreadyPaid {
        tracing::info!(%event_id, %order_id, "duplicate payment confirmation");
        return Ok(ReconcileOutcome::AlreadyPaid(order_id));
    }

    let order = repository::orders::load(&state.orm, order_id).await?;
    tracing::info!(%event_id, %order_id, total = order.pricing.total, "payment reconciled");
    after_payment(state, &order).await;
    Ok(ReconcileOutcome::Applied(order))
}

/// Post-commit side effects of a successful payment.
pub(crate) async fn after_payment(state: &AppState, order: &Order) {
    invalidate_order(state, order, order.order_type == OrderType::Togo).await;
    publish_order_event(state.notifier.as_ref(), OrderEventName::OrderUpdated, order).await;
}

/// Stores the payment method on an unpaid order. For `online` a payment
/// intent is created first; if the gateway fails nothing is persisted.
pub async fn select_payment_method(
    state: &AppState,
    order_id: Uuid,
    payload: SelectPaymentMethodRequest,
) -> AppResult<PaymentSelection> {
    let method = payload.payment_method;
    let current = repository::orders::find(&state.orm, order_id)
        .await?
        .ok_or(AppError::NotFound("order"))?;
    ensure_payable(&current)?;

    let client_secret = if method == PaymentMethod::Online {
        let restaurant = restaurant_profile(state, current.restaurant_id).await?;
        let metadata = HashMap::from([
            ("order_id".to_string(), order_id.to_string()),
            ("order_token".to_string(), current.order_token.clone()),
        ]);
        let intent = state
            .gateway
            .create_intent(current.total, restaurant.payment_account.as_deref(), &metadata)
            .await?;
        tracing::info!(%order_id, intent_id = %intent.id, amount = current.total, "payment intent created");
        Some(intent.client_secret)
    } else {
        None
    };

    state
        .settings
        .write_retry
        .run("select_payment_method", || {
            run_in_transaction(&state.orm, "select_payment_method", move |txn| {
                Box::pin(async move {
                    let order = repository::orders::find_for_update(txn, order_id).await?;
                    ensure_payable(&order)?;
                    let mut active = order.into_active_model();
                    active.payment_method = Set(Some(method.as_str().to_string()));
                    active.updated_at = Set(now());
                    active.update(txn).await?;
                    Ok(())
                })
            })
        })
        .await?;

    let order = repository::orders::load(&state.orm, order_id).await?;
    state.cache.order_changed(order.id, order.restaurant_id).await;
    publish_order_event(state.notifier.as_ref(), OrderEventName::PaymentMethodSelected, &order).await;
    Ok(PaymentSelection {
        order,
        client_secret,
    })
}

/// Restaurant profile, read through the cache.
pub async fn restaurant_profile(state: &AppState, restaurant_id: Uuid) -> AppResult<Restaurant> {
    let orm = &state.orm;
    state
        .cache
        .get_or_load(&keys::restaurant(restaurant_id), ttl::RESTAURANT, || async move {
            repository::restaurants::find(orm, restaurant_id).await
        })
        .await
}

fn ensure_payable(order: &OrderModel) -> AppResult<()> {
    let status: OrderStatus = order.status.parse()?;
    if order.is_paid || status.is_terminal() {
        return Err(AppError::OrderClosed(order.id));
    }
    Ok(())
}
