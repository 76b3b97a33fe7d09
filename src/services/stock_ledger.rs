//! Stock accounting for menu items.
//!
//! A decrement is a single conditional `UPDATE ... SET stock = stock - q
//! WHERE id = ? AND stock >= q`, so two concurrent orders can never drive
//! stock negative: the loser sees zero affected rows.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    entity::menu_items::{Column as MenuCol, Entity as MenuItems},
    error::{AppError, AppResult},
    repository,
};

/// Takes `quantity` units of `food_id` out of stock.
pub async fn decrement<C: ConnectionTrait>(conn: &C, food_id: Uuid, quantity: i32) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be positive".into()));
    }
    let result = MenuItems::update_many()
        .col_expr(MenuCol::Stock, Expr::col(MenuCol::Stock).sub(quantity))
        .filter(MenuCol::Id.eq(food_id))
        .filter(MenuCol::Stock.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        // Either the item does not exist or there is not enough of it.
        repository::menu::find(conn, food_id).await?;
        tracing::debug!(%food_id, quantity, "stock decrement refused");
        return Err(AppError::InsufficientStock { food_id });
    }
    Ok(())
}

/// Puts `quantity` units back.
pub async fn increment<C: ConnectionTrait>(conn: &C, food_id: Uuid, quantity: i32) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be positive".into()));
    }
    let result = MenuItems::update_many()
        .col_expr(MenuCol::Stock, Expr::col(MenuCol::Stock).add(quantity))
        .filter(MenuCol::Id.eq(food_id))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("food"));
    }
    Ok(())
}
