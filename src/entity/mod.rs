pub mod menu_items;
pub mod order_items;
pub mod orders;
pub mod restaurant_tables;
pub mod restaurants;
pub mod table_sessions;

pub use menu_items::Entity as MenuItems;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use restaurant_tables::Entity as RestaurantTables;
pub use restaurants::Entity as Restaurants;
pub use table_sessions::Entity as TableSessions;
