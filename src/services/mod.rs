pub mod menu_service;
pub mod order_service;
pub mod order_state;
pub mod payment_service;
pub mod stock_ledger;
pub mod table_sessions;
