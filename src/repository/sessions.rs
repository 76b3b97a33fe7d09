use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use super::{now, utc};
use crate::{
    entity::table_sessions::{
        ActiveModel as SessionActive, Column as SessionCol, Entity as Sessions, Model as SessionModel,
    },
    error::{AppError, AppResult},
    models::{SessionStatus, TableSession},
};

pub async fn find_active_for_table<C: ConnectionTrait>(
    conn: &C,
    table_id: Uuid,
) -> AppResult<Option<SessionModel>> {
    Ok(Sessions::find()
        .filter(SessionCol::TableId.eq(table_id))
        .filter(SessionCol::Status.eq(SessionStatus::Active.as_str()))
        .one(conn)
        .await?)
}

pub async fn find_for_update<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<SessionModel> {
    Sessions::find_by_id(id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("session"))
}

pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: Uuid,
    table_id: Uuid,
) -> AppResult<SessionModel> {
    Ok(SessionActive {
        id: Set(Uuid::new_v4()),
        restaurant_id: Set(restaurant_id),
        table_id: Set(table_id),
        status: Set(SessionStatus::Active.as_str().to_string()),
        order_ids: Set(serde_json::json!([])),
        total_amount: Set(0),
        opened_at: Set(now()),
        closed_at: Set(None),
    }
    .insert(conn)
    .await?)
}

pub async fn save_orders_and_total<C: ConnectionTrait>(
    conn: &C,
    session: SessionModel,
    order_ids: &[Uuid],
    total_amount: i64,
) -> AppResult<SessionModel> {
    let mut active = session.into_active_model();
    active.order_ids = Set(serde_json::to_value(order_ids).map_err(anyhow::Error::from)?);
    active.total_amount = Set(total_amount);
    Ok(active.update(conn).await?)
}

pub async fn close<C: ConnectionTrait>(conn: &C, session: SessionModel) -> AppResult<SessionModel> {
    let mut active = session.into_active_model();
    active.status = Set(SessionStatus::Closed.as_str().to_string());
    active.closed_at = Set(Some(now()));
    Ok(active.update(conn).await?)
}

pub async fn list_active<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: Uuid,
) -> AppResult<Vec<SessionModel>> {
    Ok(Sessions::find()
        .filter(SessionCol::RestaurantId.eq(restaurant_id))
        .filter(SessionCol::Status.eq(SessionStatus::Active.as_str()))
        .order_by_asc(SessionCol::OpenedAt)
        .all(conn)
        .await?)
}

pub fn order_ids(model: &SessionModel) -> AppResult<Vec<Uuid>> {
    Ok(serde_json::from_value(model.order_ids.clone()).map_err(anyhow::Error::from)?)
}

pub fn to_view(model: SessionModel) -> AppResult<TableSession> {
    Ok(TableSession {
        order_ids: order_ids(&model)?,
        id: model.id,
        restaurant_id: model.restaurant_id,
        table_id: model.table_id,
        status: model.status.parse()?,
        total_amount: model.total_amount,
        opened_at: utc(model.opened_at),
        closed_at: model.closed_at.map(utc),
    })
}
