use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub tax_rate_bps: i64,
    pub restore_stock_on_item_cancel: bool,
    pub payment: PaymentConfig,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_base: String,
    pub api_key: String,
    pub webhook_secret: String,
    pub currency: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(10);
        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.is_empty());
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let tax_rate_bps = env::var("TAX_RATE_BPS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|bps| *bps >= 0)
            .unwrap_or(1000);
        let restore_stock_on_item_cancel = env::var("RESTORE_STOCK_ON_ITEM_CANCEL")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let payment = PaymentConfig {
            api_base: env::var("PAYMENT_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            api_key: env::var("PAYMENT_API_KEY").unwrap_or_default(),
            webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET").unwrap_or_default(),
            currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
        };
        if payment.webhook_secret.is_empty() {
            tracing::warn!("PAYMENT_WEBHOOK_SECRET is not set, every webhook will be rejected");
        }
        Ok(Self {
            port,
            database_url,
            db_max_connections,
            redis_url,
            host,
            tax_rate_bps,
            restore_stock_on_item_cancel,
            payment,
        })
    }
}
