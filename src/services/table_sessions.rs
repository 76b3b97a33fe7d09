//! Table occupancy sessions.
//!
//! The write half runs on a caller-supplied transaction handle, so a session
//! is opened, linked and closed atomically with the order change that caused
//! it. The read half goes through the cache.

use sea_orm::ConnectionTrait;
use uuid::Uuid;

use crate::{
    cache::{keys, ttl},
    entity::table_sessions::Model as SessionModel,
    error::{AppError, AppResult},
    models::{OrderStatus, SessionStatus, TableSession, TableState},
    repository,
    state::AppState,
};

/// Returns the table's active session, opening one when there is none.
///
/// The table row stays locked until the caller's transaction ends, which
/// serializes concurrent first orders on the same table.
pub async fn get_or_create_active_session<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: Uuid,
    table_id: Uuid,
    waiter_id: Option<Uuid>,
) -> AppResult<SessionModel> {
    let table = repository::tables::find_for_update(conn, table_id).await?;
    if table.restaurant_id != restaurant_id {
        return Err(AppError::NotFound("table"));
    }

    if let Some(session) = repository::sessions::find_active_for_table(conn, table_id).await? {
        return Ok(session);
    }

    if table.state.parse::<TableState>()? != TableState::Available {
        return Err(AppError::TableUnavailable(table_id));
    }

    let session = repository::sessions::insert(conn, restaurant_id, table_id).await?;
    repository::tables::occupy(conn, table, session.id, waiter_id).await?;
    tracing::info!(%table_id, session_id = %session.id, "table session opened");
    Ok(session)
}

/// Links `order_id` to the session and adds `amount` to its total.
pub async fn attach_order<C: ConnectionTrait>(
    conn: &C,
    session_id: Uuid,
    order_id: Uuid,
    amount: i64,
) -> AppResult<SessionModel> {
    let session = repository::sessions::find_for_update(conn, session_id).await?;
    let mut order_ids = repository::sessions::order_ids(&session)?;
    if !order_ids.contains(&order_id) {
        order_ids.push(order_id);
    }
    let total = session.total_amount + amount;
    repository::sessions::save_orders_and_total(conn, session, &order_ids, total).await
}

/// Shifts the session total by `delta` (negative on item cancellation).
pub async fn adjust_total<C: ConnectionTrait>(
    conn: &C,
    session_id: Uuid,
    delta: i64,
) -> AppResult<SessionModel> {
    let session = repository::sessions::find_for_update(conn, session_id).await?;
    if delta == 0 {
        return Ok(session);
    }
    let order_ids = repository::sessions::order_ids(&session)?;
    let total = (session.total_amount + delta).max(0);
    repository::sessions::save_orders_and_total(conn, session, &order_ids, total).await
}

/// Closes the session and frees its table once every linked order is paid
/// or cancelled. Returns whether the session was closed.
pub async fn close_if_complete<C: ConnectionTrait>(conn: &C, session_id: Uuid) -> AppResult<bool> {
    let session = repository::sessions::find_for_update(conn, session_id).await?;
    if session.status.parse::<SessionStatus>()? == SessionStatus::Closed {
        return Ok(false);
    }

    for order_id in repository::sessions::order_ids(&session)? {
        let Some(order) = repository::orders::find(conn, order_id).await? else {
            continue;
        };
        if !order.status.parse::<OrderStatus>()?.is_terminal() {
            return Ok(false);
        }
    }

    let table_id = session.table_id;
    repository::sessions::close(conn, session).await?;
    repository::tables::release(conn, table_id).await?;
    tracing::info!(%table_id, %session_id, "table session closed");
    Ok(true)
}

/// The table's active session, if any.
pub async fn active_session_for_table(
    state: &AppState,
    table_id: Uuid,
) -> AppResult<Option<TableSession>> {
    let orm = &state.orm;
    state
        .cache
        .get_or_load(&keys::table_session(table_id), ttl::TABLE_SESSION, || async move {
            repository::sessions::find_active_for_table(orm, table_id)
                .await?
                .map(repository::sessions::to_view)
                .transpose()
        })
        .await
}

pub async fn list_active_sessions(
    state: &AppState,
    restaurant_id: Uuid,
) -> AppResult<Vec<TableSession>> {
    let orm = &state.orm;
    state
        .cache
        .get_or_load(
            &keys::active_sessions(restaurant_id),
            ttl::ACTIVE_SESSIONS,
            || async move {
                repository::sessions::list_active(orm, restaurant_id)
                    .await?
                    .into_iter()
                    .map(repository::sessions::to_view)
                    .collect()
            },
        )
        .await
}
