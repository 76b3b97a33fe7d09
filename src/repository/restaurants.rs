use sea_orm::{ConnectionTrait, EntityTrait};
use uuid::Uuid;

use crate::{
    entity::restaurants::{Entity as Restaurants, Model as RestaurantModel},
    error::{AppError, AppResult},
    models::Restaurant,
};

pub async fn find<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<Restaurant> {
    Restaurants::find_by_id(id)
        .one(conn)
        .await?
        .map(to_view)
        .ok_or(AppError::NotFound("restaurant"))
}

pub fn to_view(model: RestaurantModel) -> Restaurant {
    Restaurant {
        id: model.id,
        name: model.name,
        payment_account: model.payment_account,
    }
}
