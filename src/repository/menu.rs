use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use crate::{
    dto::menu::MenuQuery,
    entity::menu_items::{Column as MenuCol, Entity as MenuItems, Model as MenuItemModel},
    error::{AppError, AppResult},
    models::MenuItem,
};

pub async fn find<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<MenuItemModel> {
    MenuItems::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound("food"))
}

pub async fn list<C: ConnectionTrait>(
    conn: &C,
    restaurant_id: Uuid,
    query: &MenuQuery,
) -> AppResult<Vec<MenuItemModel>> {
    let mut finder = MenuItems::find().filter(MenuCol::RestaurantId.eq(restaurant_id));
    if let Some(category) = query.category.as_deref() {
        finder = finder.filter(MenuCol::Category.eq(category));
    }
    if query.available_only {
        finder = finder
            .filter(MenuCol::IsAvailable.eq(true))
            .filter(MenuCol::Stock.gt(0));
    }
    Ok(finder.order_by_asc(MenuCol::Name).all(conn).await?)
}

pub fn to_view(model: MenuItemModel) -> MenuItem {
    MenuItem {
        id: model.id,
        restaurant_id: model.restaurant_id,
        name: model.name,
        category: model.category,
        price: model.price,
        stock: model.stock,
        is_available: model.is_available,
    }
}
