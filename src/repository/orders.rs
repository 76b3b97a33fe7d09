use std::collections::HashMap;

use sea_orm::sea_query::{LockType, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use super::{now, utc};
use crate::{
    entity::{
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    models::{ItemStatus, Order, OrderItem, OrderPricing, OrderStatus, PaymentMethod},
    routes::params::{OrderListQuery, SortOrder},
    services::order_state::PricedLine,
};

/// A menu line resolved against the catalogue, ready to be stored.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub food_id: Uuid,
    pub name: String,
    pub price: i64,
    pub quantity: i32,
    pub note: Option<String>,
}

pub async fn find<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<Option<OrderModel>> {
    Ok(Orders::find_by_id(id).one(conn).await?)
}

/// Loads and row-locks an order for the rest of the transaction.
pub async fn find_for_update<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<OrderModel> {
    Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("order"))
}

pub async fn find_by_token_for_update<C: ConnectionTrait>(
    conn: &C,
    token: &str,
) -> AppResult<OrderModel> {
    Orders::find()
        .filter(OrderCol::OrderToken.eq(token))
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("order"))
}

pub async fn items<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<Vec<OrderItemModel>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::Position)
        .all(conn)
        .await?)
}

pub async fn insert_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    first_position: i32,
    status: ItemStatus,
    lines: &[NewItem],
) -> AppResult<Vec<OrderItemModel>> {
    let mut inserted = Vec::with_capacity(lines.len());
    for (offset, line) in lines.iter().enumerate() {
        let stamp = now();
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            food_id: Set(line.food_id),
            name: Set(line.name.clone()),
            price: Set(line.price),
            quantity: Set(line.quantity),
            status: Set(status.as_str().to_string()),
            deletion_reason: Set(None),
            note: Set(line.note.clone()),
            position: Set(first_position + offset as i32),
            created_at: Set(stamp),
            updated_at: Set(stamp),
        }
        .insert(conn)
        .await?;
        inserted.push(item);
    }
    Ok(inserted)
}

pub async fn set_item_status<C: ConnectionTrait>(
    conn: &C,
    item: OrderItemModel,
    status: ItemStatus,
    deletion_reason: Option<String>,
) -> AppResult<OrderItemModel> {
    let mut active = item.into_active_model();
    active.status = Set(status.as_str().to_string());
    if deletion_reason.is_some() {
        active.deletion_reason = Set(deletion_reason);
    }
    active.updated_at = Set(now());
    Ok(active.update(conn).await?)
}

/// Loads an order with its items as a view.
pub async fn load<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<Order> {
    let order = find(conn, id).await?.ok_or(AppError::NotFound("order"))?;
    let items = items(conn, order.id).await?;
    order_from_entity(order, items)
}

/// Per-restaurant listing with status/type/date/search filters and a total count.
pub async fn list<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: Uuid,
    query: &OrderListQuery,
) -> AppResult<(Vec<Order>, i64)> {
    let (_, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::RestaurantId.eq(restaurant_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }
    if let Some(order_type) = query.order_type {
        condition = condition.add(OrderCol::OrderType.eq(order_type.as_str()));
    }
    if let Some(from) = query.from {
        condition = condition.add(OrderCol::CreatedAt.gte(from.fixed_offset()));
    }
    if let Some(to) = query.to {
        condition = condition.add(OrderCol::CreatedAt.lt(to.fixed_offset()));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        condition = condition.add(
            Condition::any()
                .add(OrderCol::CustomerName.contains(search))
                .add(OrderCol::OrderToken.eq(search)),
        );
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(conn).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(conn)
        .await?;

    Ok((with_items(conn, orders).await?, total))
}

/// Orders of the restaurant that still have something for the kitchen to do:
/// not cancelled, with at least one item pending, preparing or ready.
pub async fn kitchen_queue<C: ConnectionTrait>(conn: &C, restaurant_id: Uuid) -> AppResult<Vec<Order>> {
    let live_items = Query::select()
        .column(OrderItemCol::OrderId)
        .from(OrderItems)
        .and_where(OrderItemCol::Status.is_in([
            ItemStatus::Pending.as_str(),
            ItemStatus::Preparing.as_str(),
            ItemStatus::Ready.as_str(),
        ]))
        .to_owned();

    let orders = Orders::find()
        .filter(OrderCol::RestaurantId.eq(restaurant_id))
        .filter(OrderCol::Status.ne(OrderStatus::Cancelled.as_str()))
        .filter(OrderCol::Id.in_subquery(live_items))
        .order_by_asc(OrderCol::CreatedAt)
        .all(conn)
        .await?;

    with_items(conn, orders).await
}

async fn with_items<C: ConnectionTrait>(conn: &C, orders: Vec<OrderModel>) -> AppResult<Vec<Order>> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut grouped: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
    for item in OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(ids))
        .order_by_asc(OrderItemCol::Position)
        .all(conn)
        .await?
    {
        grouped.entry(item.order_id).or_default().push(item);
    }
    orders
        .into_iter()
        .map(|order| {
            let items = grouped.remove(&order.id).unwrap_or_default();
            order_from_entity(order, items)
        })
        .collect()
}

pub fn priced_lines(items: &[OrderItemModel]) -> AppResult<Vec<PricedLine>> {
    items
        .iter()
        .map(|item| Ok((item.price, item.quantity, item.status.parse::<ItemStatus>()?)))
        .collect()
}

pub fn order_from_entity(model: OrderModel, items: Vec<OrderItemModel>) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        restaurant_id: model.restaurant_id,
        order_type: model.order_type.parse()?,
        status: model.status.parse()?,
        order_token: model.order_token,
        table_id: model.table_id,
        session_id: model.session_id,
        customer_id: model.customer_id,
        customer_name: model.customer_name,
        waiter_id: model.waiter_id,
        pricing: OrderPricing {
            subtotal: model.subtotal,
            tax: model.tax,
            total: model.total,
        },
        is_paid: model.is_paid,
        payment_method: model
            .payment_method
            .as_deref()
            .map(str::parse::<PaymentMethod>)
            .transpose()?,
        cancellation_reason: model.cancellation_reason,
        cancelled_by: model.cancelled_by,
        paid_at: model.paid_at.map(utc),
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
        items: items
            .into_iter()
            .map(order_item_from_entity)
            .collect::<AppResult<_>>()?,
    })
}

fn order_item_from_entity(model: OrderItemModel) -> AppResult<OrderItem> {
    Ok(OrderItem {
        id: model.id,
        food_id: model.food_id,
        name: model.name,
        price: model.price,
        quantity: model.quantity,
        status: model.status.parse()?,
        deletion_reason: model.deletion_reason,
        note: model.note,
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
    })
}
