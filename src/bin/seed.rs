use chrono::Utc;
use restaurant_order_engine::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        menu_items::{self, ActiveModel as MenuItemActive},
        restaurant_tables::{self, ActiveModel as TableActive},
        restaurants::{self, ActiveModel as RestaurantActive},
    },
    models::TableState,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

const DEMO_RESTAURANT: &str = "Demo Bistro";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let restaurant_id = ensure_restaurant(&orm).await?;
    let tables = seed_tables(&orm, restaurant_id).await?;
    let dishes = seed_menu(&orm, restaurant_id).await?;

    println!("Seed completed. Restaurant ID: {restaurant_id}, tables: {tables}, menu items: {dishes}");
    Ok(())
}

async fn ensure_restaurant(orm: &DatabaseConnection) -> anyhow::Result<Uuid> {
    if let Some(existing) = restaurants::Entity::find()
        .filter(restaurants::Column::Name.eq(DEMO_RESTAURANT))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let restaurant = RestaurantActive {
        id: Set(Uuid::new_v4()),
        name: Set(DEMO_RESTAURANT.into()),
        payment_account: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;
    Ok(restaurant.id)
}

async fn seed_tables(orm: &DatabaseConnection, restaurant_id: Uuid) -> anyhow::Result<usize> {
    let existing = restaurant_tables::Entity::find()
        .filter(restaurant_tables::Column::RestaurantId.eq(restaurant_id))
        .all(orm)
        .await?;
    let mut created = 0;
    for n in 1..=6 {
        let label = format!("T{n}");
        if existing.iter().any(|t| t.label == label) {
            continue;
        }
        TableActive {
            id: Set(Uuid::new_v4()),
            restaurant_id: Set(restaurant_id),
            label: Set(label),
            state: Set(TableState::Available.as_str().to_string()),
            waiter_serving: Set(None),
            active_session_id: Set(None),
            created_at: Set(Utc::now().into()),
        }
        .insert(orm)
        .await?;
        created += 1;
    }
    Ok(created)
}

async fn seed_menu(orm: &DatabaseConnection, restaurant_id: Uuid) -> anyhow::Result<usize> {
    let dishes = [
        ("Margherita", "pizza", 1_200_i64, 40),
        ("Quattro Formaggi", "pizza", 1_450, 30),
        ("Caesar Salad", "starters", 850, 25),
        ("Tiramisu", "desserts", 650, 20),
        ("Espresso", "drinks", 250, 200),
        ("Sparkling Water", "drinks", 300, 120),
    ];

    let mut created = 0;
    for (name, category, price, stock) in dishes {
        let exists = menu_items::Entity::find()
            .filter(menu_items::Column::RestaurantId.eq(restaurant_id))
            .filter(menu_items::Column::Name.eq(name))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }
        MenuItemActive {
            id: Set(Uuid::new_v4()),
            restaurant_id: Set(restaurant_id),
            name: Set(name.into()),
            category: Set(Some(category.into())),
            price: Set(price),
            stock: Set(stock),
            is_available: Set(true),
            created_at: Set(Utc::now().into()),
        }
        .insert(orm)
        .await?;
        created += 1;
    }
    Ok(created)
}
