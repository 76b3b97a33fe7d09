use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "table_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub table_id: Uuid,
    pub status: String,
    /// Ordered list of linked order ids.
    pub order_ids: Json,
    pub total_amount: i64,
    pub opened_at: DateTimeWithTimeZone,
    pub closed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::restaurant_tables::Entity",
        from = "Column::TableId",
        to = "super::restaurant_tables::Column::Id"
    )]
    RestaurantTables,
}

impl Related<super::restaurant_tables::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RestaurantTables.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
