use sea_orm::{ActiveModelTrait, ConnectionTrait, IntoActiveModel, Set};
use uuid::Uuid;

use crate::{
    cache::{keys, ttl},
    dto::orders::{
        Actor, AppendItemsRequest, CreateOrderRequest, OrderLineRequest, OrderList,
        UpdateItemStatusRequest, UpdateOrderStatusRequest,
    },
    entity::orders::ActiveModel as OrderActive,
    error::{AppError, AppResult},
    models::{ItemStatus, KitchenOrder, Order, OrderStatus, OrderType, PaymentMethod},
    notify::{OrderEventName, publish_order_event},
    repository::{self, now, orders::NewItem},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::{
        order_state::{
            compute_pricing, kitchen_status, should_await_payment, validate_item_transition,
            validate_order_transition,
        },
        payment_service::{self, PaymentApplied},
        stock_ledger, table_sessions,
    },
    state::AppState,
    transaction::run_in_transaction,
};

/// Upper bound on the quantity of a single order line.
pub const MAX_LINE_QUANTITY: i32 = 1_000;

/// Places a new order.
///
/// Dine-in: stock is reserved line by line, the table's session is opened
/// (or reused) and the order starts `open` with `pending` items. Togo: no
/// stock is touched, the order and its items wait for payment.
pub async fn create_order(state: &AppState, payload: CreateOrderRequest) -> AppResult<Order> {
    validate_lines(&payload.items)?;
    if payload.order_type == OrderType::DineIn && payload.table_id.is_none() {
        return Err(AppError::BadRequest("dine-in orders need a table".into()));
    }

    let tax_rate_bps = state.settings.tax_rate_bps;
    let order_id = state
        .settings
        .write_retry
        .run("create_order", || {
            let payload = payload.clone();
            run_in_transaction(&state.orm, "create_order", move |txn| {
                Box::pin(async move {
                    let restaurant_id = payload.restaurant_id;
                    repository::restaurants::find(txn, restaurant_id).await?;
                    let lines = resolve_lines(txn, restaurant_id, &payload.items).await?;

                    let (order_status, item_status, session) = match payload.order_type {
                        OrderType::DineIn => {
                            for line in &lines {
                                stock_ledger::decrement(txn, line.food_id, line.quantity).await?;
                            }
                            let table_id = payload
                                .table_id
                                .ok_or_else(|| AppError::BadRequest("dine-in orders need a table".into()))?;
                            let session = table_sessions::get_or_create_active_session(
                                txn,
                                restaurant_id,
                                table_id,
                                payload.waiter_id,
                            )
                            .await?;
                            (OrderStatus::Open, ItemStatus::Pending, Some(session))
                        }
                        OrderType::Togo => (OrderStatus::AwaitingPayment, ItemStatus::AwaitingPayment, None),
                    };

                    let priced: Vec<_> = lines
                        .iter()
                        .map(|line| (line.price, line.quantity, item_status))
                        .collect();
                    let pricing = compute_pricing(&priced, tax_rate_bps)?;

                    let stamp = now();
                    let order = OrderActive {
                        id: Set(Uuid::new_v4()),
                        restaurant_id: Set(restaurant_id),
                        order_type: Set(payload.order_type.as_str().to_string()),
                        status: Set(order_status.as_str().to_string()),
                        order_token: Set(Uuid::new_v4().simple().to_string()),
                        table_id: Set(payload.table_id.filter(|_| session.is_some())),
                        session_id: Set(session.as_ref().map(|s| s.id)),
                        customer_id: Set(payload.customer_id),
                        customer_name: Set(payload.customer_name.clone()),
                        waiter_id: Set(payload.waiter_id),
                        subtotal: Set(pricing.subtotal),
                        tax: Set(pricing.tax),
                        total: Set(pricing.total),
                        is_paid: Set(false),
                        payment_method: Set(None),
                        cancellation_reason: Set(None),
                        cancelled_by: Set(None),
                        paid_at: Set(None),
                        created_at: Set(stamp),
                        updated_at: Set(stamp),
                    }
                    .insert(txn)
                    .await?;

                    repository::orders::insert_items(txn, order.id, 0, item_status, &lines).await?;
                    if let Some(session) = session {
                        table_sessions::attach_order(txn, session.id, order.id, pricing.total).await?;
                    }
                    Ok(order.id)
                })
            })
        })
        .await?;

    let order = repository::orders::load(&state.orm, order_id).await?;
    tracing::info!(
        order_id = %order.id,
        order_type = %order.order_type,
        total = order.pricing.total,
        "order created"
    );
    invalidate_order(state, &order, order.order_type == OrderType::DineIn).await;
    publish_order_event(state.notifier.as_ref(), OrderEventName::OrderCreated, &order).await;
    Ok(order)
}

/// Adds lines to an existing order, addressed by its resumable token.
pub async fn append_items(
    state: &AppState,
    order_token: &str,
    payload: AppendItemsRequest,
) -> AppResult<Order> {
    validate_lines(&payload.items)?;

    let tax_rate_bps = state.settings.tax_rate_bps;
    let token = order_token.to_string();
    let order_id = state
        .settings
        .write_retry
        .run("append_items", || {
            let (token, payload) = (token.clone(), payload.clone());
            run_in_transaction(&state.orm, "append_items", move |txn| {
                Box::pin(async move {
                    let order = repository::orders::find_by_token_for_update(txn, &token).await?;
                    let status: OrderStatus = order.status.parse()?;
                    let order_type: OrderType = order.order_type.parse()?;
                    if order.is_paid || status.is_terminal() {
                        return Err(AppError::OrderClosed(order.id));
                    }
                    // An online intent is created for the total at selection time; the
                    // order must not grow under it. Selecting another method unlocks it.
                    if order.payment_method.as_deref() == Some(PaymentMethod::Online.as_str()) {
                        return Err(AppError::PaymentPending(order.id));
                    }
                    let item_status = match (order_type, status) {
                        (OrderType::DineIn, OrderStatus::Open) => ItemStatus::Pending,
                        (OrderType::Togo, OrderStatus::AwaitingPayment) => ItemStatus::AwaitingPayment,
                        (_, from) => return Err(AppError::invalid_transition(from, OrderStatus::Open)),
                    };

                    let lines = resolve_lines(txn, order.restaurant_id, &payload.items).await?;
                    if order_type == OrderType::DineIn {
                        for line in &lines {
                            stock_ledger::decrement(txn, line.food_id, line.quantity).await?;
                        }
                    }

                    let existing = repository::orders::items(txn, order.id).await?;
                    let next_position = existing.iter().map(|i| i.position + 1).max().unwrap_or(0);
                    repository::orders::insert_items(txn, order.id, next_position, item_status, &lines)
                        .await?;

                    let items = repository::orders::items(txn, order.id).await?;
                    let pricing = compute_pricing(&repository::orders::priced_lines(&items)?, tax_rate_bps)?;
                    let delta = pricing.total - order.total;
                    let session_id = order.session_id;
                    let order_id = order.id;

                    let mut active = order.into_active_model();
                    active.subtotal = Set(pricing.subtotal);
                    active.tax = Set(pricing.tax);
                    active.total = Set(pricing.total);
                    active.updated_at = Set(now());
                    active.update(txn).await?;

                    if let Some(session_id) = session_id {
                        table_sessions::adjust_total(txn, session_id, delta).await?;
                    }
                    Ok(order_id)
                })
            })
        })
        .await?;

    let order = repository::orders::load(&state.orm, order_id).await?;
    tracing::info!(order_id = %order.id, total = order.pricing.total, "items appended");
    invalidate_order(state, &order, order.order_type == OrderType::DineIn).await;
    publish_order_event(state.notifier.as_ref(), OrderEventName::ItemAdded, &order).await;
    Ok(order)
}

struct ItemChange {
    order_id: Uuid,
    order_status_changed: bool,
    stock_restored: bool,
}

/// Moves one item along the kitchen flow or cancels it.
///
/// A cancellation reprices the order and the session total in the same
/// transaction. When the last live item reaches a terminal state an `open`
/// order moves to `awaiting_payment`.
pub async fn update_item_status(
    state: &AppState,
    order_id: Uuid,
    item_id: Uuid,
    payload: UpdateItemStatusRequest,
) -> AppResult<Order> {
    let tax_rate_bps = state.settings.tax_rate_bps;
    let restore_stock = state.settings.restore_stock_on_item_cancel;
    let change = state
        .settings
        .write_retry
        .run("update_item_status", || {
            let payload = payload.clone();
            run_in_transaction(&state.orm, "update_item_status", move |txn| {
                Box::pin(async move {
                    let order = repository::orders::find_for_update(txn, order_id).await?;
                    let order_status: OrderStatus = order.status.parse()?;
                    let target = payload.status;
                    // A paid order still moves through the kitchen, but its items
                    // can no longer be cancelled.
                    if order_status == OrderStatus::Cancelled
                        || (order_status == OrderStatus::Paid && target == ItemStatus::Cancelled)
                    {
                        return Err(AppError::OrderClosed(order.id));
                    }

                    let mut items = repository::orders::items(txn, order.id).await?;
                    let index = items
                        .iter()
                        .position(|item| item.id == item_id)
                        .ok_or(AppError::NotFound("item"))?;
                    let from: ItemStatus = items[index].status.parse()?;
                    if from == ItemStatus::AwaitingPayment && target == ItemStatus::Pending && !order.is_paid {
                        return Err(AppError::invalid_transition(from, target));
                    }
                    validate_item_transition(from, target, payload.deletion_reason.as_deref())?;

                    let reason = if target == ItemStatus::Cancelled {
                        payload.deletion_reason.map(|r| r.trim().to_string())
                    } else {
                        None
                    };
                    let item = items.remove(index);
                    let (food_id, quantity) = (item.food_id, item.quantity);
                    let updated =
                        repository::orders::set_item_status(txn, item, target, reason).await?;
                    items.insert(index, updated);

                    let mut stock_restored = false;
                    if target == ItemStatus::Cancelled && restore_stock && from != ItemStatus::AwaitingPayment {
                        stock_ledger::increment(txn, food_id, quantity).await?;
                        stock_restored = true;
                    }

                    let statuses = items
                        .iter()
                        .map(|item| item.status.parse())
                        .collect::<AppResult<Vec<ItemStatus>>>()?;
                    let next_status = if should_await_payment(order_status, &statuses) {
                        validate_order_transition(order_status, OrderStatus::AwaitingPayment, None)?;
                        OrderStatus::AwaitingPayment
                    } else {
                        order_status
                    };

                    let session_id = order.session_id;
                    let old_total = order.total;
                    let mut active = order.into_active_model();
                    let mut delta = 0;
                    if target == ItemStatus::Cancelled {
                        let pricing =
                            compute_pricing(&repository::orders::priced_lines(&items)?, tax_rate_bps)?;
                        delta = pricing.total - old_total;
                        active.subtotal = Set(pricing.subtotal);
                        active.tax = Set(pricing.tax);
                        active.total = Set(pricing.total);
                    }
                    active.status = Set(next_status.as_str().to_string());
                    active.updated_at = Set(now());
                    active.update(txn).await?;

                    if let Some(session_id) = session_id {
                        table_sessions::adjust_total(txn, session_id, delta).await?;
                    }

                    Ok(ItemChange {
                        order_id,
                        order_status_changed: next_status != order_status,
                        stock_restored,
                    })
                })
            })
        })
        .await?;

    let order = repository::orders::load(&state.orm, change.order_id).await?;
    tracing::info!(
        order_id = %order.id,
        %item_id,
        status = %item_status_label(&order, item_id),
        order_status = %order.status,
        "item status updated"
    );
    invalidate_order(state, &order, change.stock_restored).await;
    publish_order_event(state.notifier.as_ref(), OrderEventName::ItemUpdated, &order).await;
    if change.order_status_changed {
        publish_order_event(state.notifier.as_ref(), OrderEventName::OrderUpdated, &order).await;
    }
    Ok(order)
}

/// Explicit order transitions: `paid` (operator-recorded payment) and
/// `cancelled`. Everything else is driven by item changes.
pub async fn update_order_status(
    state: &AppState,
    actor: &Actor,
    order_id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<Order> {
    match payload.status {
        OrderStatus::Paid => {
            let method = payload.payment_method;
            let applied = state
                .settings
                .write_retry
                .run("pay_order", || {
                    run_in_transaction(&state.orm, "pay_order", move |txn| {
                        Box::pin(async move {
                            let order = repository::orders::find_for_update(txn, order_id).await?;
                            payment_service::apply_payment(txn, order, method).await
                        })
                    })
                })
                .await?;

            let order = repository::orders::load(&state.orm, order_id).await?;
            if applied == PaymentApplied::Applied {
                tracing::info!(order_id = %order.id, actor = %actor.label(), "order paid");
                payment_service::after_payment(state, &order).await;
            }
            Ok(order)
        }
        OrderStatus::Cancelled => {
            let cancelled_by = actor.label();
            let reason = payload.cancellation_reason;
            state
                .settings
                .write_retry
                .run("cancel_order", || {
                    let (cancelled_by, reason) = (cancelled_by.clone(), reason.clone());
                    run_in_transaction(&state.orm, "cancel_order", move |txn| {
                        Box::pin(async move {
                            let order = repository::orders::find_for_update(txn, order_id).await?;
                            let status: OrderStatus = order.status.parse()?;
                            if status.is_terminal() {
                                return Err(AppError::OrderClosed(order.id));
                            }
                            validate_order_transition(status, OrderStatus::Cancelled, reason.as_deref())?;

                            let session_id = order.session_id;
                            let mut active = order.into_active_model();
                            active.status = Set(OrderStatus::Cancelled.as_str().to_string());
                            active.cancellation_reason = Set(reason.map(|r| r.trim().to_string()));
                            active.cancelled_by = Set(Some(cancelled_by));
                            active.updated_at = Set(now());
                            active.update(txn).await?;

                            if let Some(session_id) = session_id {
                                table_sessions::close_if_complete(txn, session_id).await?;
                            }
                            Ok(())
                        })
                    })
                })
                .await?;

            let order = repository::orders::load(&state.orm, order_id).await?;
            tracing::info!(order_id = %order.id, actor = %actor.label(), "order cancelled");
            invalidate_order(state, &order, false).await;
            publish_order_event(state.notifier.as_ref(), OrderEventName::OrderUpdated, &order).await;
            Ok(order)
        }
        target => {
            let order = repository::orders::find(&state.orm, order_id)
                .await?
                .ok_or(AppError::NotFound("order"))?;
            let from: OrderStatus = order.status.parse()?;
            Err(AppError::invalid_transition(from, target))
        }
    }
}

pub async fn get_order(state: &AppState, order_id: Uuid) -> AppResult<Order> {
    let orm = &state.orm;
    state
        .cache
        .get_or_load(&keys::order(order_id), ttl::ORDER, || async move {
            repository::orders::load(orm, order_id).await
        })
        .await
}

pub async fn list_orders(
    state: &AppState,
    restaurant_id: Uuid,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, _) = query.pagination().normalize();
    let (items, total) = repository::orders::list(&state.orm, restaurant_id, &query).await?;
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

/// Kitchen queue: orders with at least one item still to prepare or serve,
/// each with its display status.
pub async fn list_active_orders(state: &AppState, restaurant_id: Uuid) -> AppResult<Vec<KitchenOrder>> {
    let orm = &state.orm;
    state
        .cache
        .get_or_load(
            &keys::active_orders(restaurant_id),
            ttl::ACTIVE_ORDERS,
            || async move {
                let orders = repository::orders::kitchen_queue(orm, restaurant_id).await?;
                Ok(orders
                    .into_iter()
                    .map(|order| {
                        let statuses: Vec<_> = order.items.iter().map(|i| i.status).collect();
                        KitchenOrder {
                            kitchen_status: kitchen_status(&statuses),
                            order,
                        }
                    })
                    .collect())
            },
        )
        .await
}

/// Drops every cache entry that can hold a stale copy of `order`.
pub(crate) async fn invalidate_order(state: &AppState, order: &Order, menu_touched: bool) {
    state.cache.order_changed(order.id, order.restaurant_id).await;
    if let Some(table_id) = order.table_id {
        state.cache.session_changed(table_id, order.restaurant_id).await;
    }
    if menu_touched {
        state.cache.menu_changed(order.restaurant_id).await;
    }
}

fn validate_lines(lines: &[OrderLineRequest]) -> AppResult<()> {
    if lines.is_empty() {
        return Err(AppError::BadRequest("an order needs at least one item".into()));
    }
    if let Some(line) = lines
        .iter()
        .find(|line| !(1..=MAX_LINE_QUANTITY).contains(&line.quantity))
    {
        return Err(AppError::BadRequest(format!(
            "quantity for {} must be between 1 and {MAX_LINE_QUANTITY}",
            line.food_id
        )));
    }
    Ok(())
}

/// Snapshots name and price of each requested menu item.
async fn resolve_lines<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: Uuid,
    lines: &[OrderLineRequest],
) -> AppResult<Vec<NewItem>> {
    let mut resolved = Vec::with_capacity(lines.len());
    for line in lines {
        let food = repository::menu::find(conn, line.food_id).await?;
        if food.restaurant_id != restaurant_id {
            return Err(AppError::NotFound("food"));
        }
        if !food.is_available {
            return Err(AppError::BadRequest(format!("{} is not available", food.name)));
        }
        resolved.push(NewItem {
            food_id: food.id,
            name: food.name,
            price: food.price,
            quantity: line.quantity,
            note: line.note.clone(),
        });
    }
    Ok(resolved)
}

fn item_status_label(order: &Order, item_id: Uuid) -> String {
    order
        .items
        .iter()
        .find(|item| item.id == item_id)
        .map(|item| item.status.to_string())
        .unwrap_or_default()
}
