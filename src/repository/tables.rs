use sea_orm::sea_query::LockType;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QuerySelect, Set};
use uuid::Uuid;

use crate::{
    entity::restaurant_tables::{Entity as Tables, Model as TableModel},
    error::{AppError, AppResult},
    models::{Table, TableState},
};

pub async fn find_for_update<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<TableModel> {
    Tables::find_by_id(id)
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("table"))
}

/// Marks the table occupied by `session_id`.
pub async fn occupy<C: ConnectionTrait>(
    conn: &C,
    table: TableModel,
    session_id: Uuid,
    waiter_id: Option<Uuid>,
) -> AppResult<TableModel> {
    let keep_waiter = table.waiter_serving;
    let mut active = table.into_active_model();
    active.state = Set(TableState::Occupied.as_str().to_string());
    active.active_session_id = Set(Some(session_id));
    active.waiter_serving = Set(waiter_id.or(keep_waiter));
    Ok(active.update(conn).await?)
}

/// Returns the table to `available` and clears its session and waiter.
pub async fn release<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<TableModel> {
    let table = find_for_update(conn, id).await?;
    let mut active = table.into_active_model();
    active.state = Set(TableState::Available.as_str().to_string());
    active.active_session_id = Set(None);
    active.waiter_serving = Set(None);
    Ok(active.update(conn).await?)
}

pub fn to_view(model: TableModel) -> AppResult<Table> {
    Ok(Table {
        id: model.id,
        restaurant_id: model.restaurant_id,
        label: model.label,
        state: model.state.parse()?,
        waiter_serving: model.waiter_serving,
        active_session_id: model.active_session_id,
    })
}
