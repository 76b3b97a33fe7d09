use uuid::Uuid;

use crate::{
    cache::{keys, ttl},
    dto::menu::{MenuList, MenuQuery, RestockRequest},
    error::{AppError, AppResult},
    models::MenuItem,
    repository,
    services::stock_ledger,
    state::AppState,
    transaction::run_in_transaction,
};

/// Menu of a restaurant, cached per filter set.
pub async fn list_menu(state: &AppState, restaurant_id: Uuid, query: MenuQuery) -> AppResult<MenuList> {
    let key = keys::menu(restaurant_id, &query.filter_hash());
    let orm = &state.orm;
    state
        .cache
        .get_or_load(&key, ttl::MENU, || async move {
            let items = repository::menu::list(orm, restaurant_id, &query)
                .await?
                .into_iter()
                .map(repository::menu::to_view)
                .collect();
            Ok(MenuList { items })
        })
        .await
}

/// Operator restock. Every cached menu listing of the restaurant is dropped
/// afterwards.
pub async fn restock(state: &AppState, food_id: Uuid, payload: RestockRequest) -> AppResult<MenuItem> {
    let quantity = payload.quantity;
    if quantity < 1 {
        return Err(AppError::BadRequest("restock quantity must be at least 1".into()));
    }
    let item = state
        .settings
        .write_retry
        .run("restock", || {
            run_in_transaction(&state.orm, "restock", move |txn| {
                Box::pin(async move {
                    stock_ledger::increment(txn, food_id, quantity).await?;
                    repository::menu::find(txn, food_id).await
                })
            })
        })
        .await?;

    tracing::info!(%food_id, quantity, stock = item.stock, "menu item restocked");
    state.cache.menu_changed(item.restaurant_id).await;
    Ok(repository::menu::to_view(item))
}
