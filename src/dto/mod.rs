pub mod menu;
pub mod orders;
