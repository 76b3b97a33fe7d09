use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::cache::CacheInvalidator;
use crate::config::AppConfig;
use crate::gateway::PaymentGateway;
use crate::notify::NotificationPort;
use crate::retry::RetryPolicy;

/// Business knobs the services read on every call.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub tax_rate_bps: i64,
    pub restore_stock_on_item_cancel: bool,
    pub webhook_secret: String,
    /// Applied to every transactional operation that can lose a write race.
    pub write_retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1000,
            restore_stock_on_item_cancel: false,
            webhook_secret: String::new(),
            write_retry: RetryPolicy::write_conflicts(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            tax_rate_bps: config.tax_rate_bps,
            restore_stock_on_item_cancel: config.restore_stock_on_item_cancel,
            webhook_secret: config.payment.webhook_secret.clone(),
            write_retry: RetryPolicy::write_conflicts(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub cache: CacheInvalidator,
    pub notifier: Arc<dyn NotificationPort>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub settings: EngineSettings,
}
