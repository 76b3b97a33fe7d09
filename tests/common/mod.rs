#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use restaurant_order_engine::{
    cache::{CacheError, CacheInvalidator, CacheStore, InMemoryCache},
    dto::orders::{Actor, CreateOrderRequest, OrderLineRequest},
    entity::{
        menu_items::{self, ActiveModel as MenuItemActive},
        order_items, orders,
        restaurant_tables::{self, ActiveModel as TableActive},
        restaurants::{self, ActiveModel as RestaurantActive},
        table_sessions,
    },
    error::{AppError, AppResult},
    gateway::{GatewayEvent, PaymentGateway, PaymentIntent, parse_event, verify_signature},
    models::{OrderType, TableState},
    notify::{
        BroadcastNotifier, Channel, Notification, NotificationPort, NotifyError, OrderEventName,
    },
    retry::RetryPolicy,
    state::{AppState, EngineSettings},
};
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    Schema, Set,
};
use sha2::Sha256;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const TAX_RATE_BPS: i64 = 1000;

pub struct TestApp {
    pub state: AppState,
    pub notifier: BroadcastNotifier,
    pub gateway: Arc<FakeGateway>,
    pub restaurant_id: Uuid,
}

#[derive(Default)]
pub struct Options {
    pub failing_cache: bool,
    pub failing_notifier: bool,
    pub failing_gateway: bool,
    pub restore_stock_on_item_cancel: bool,
}

pub async fn setup() -> anyhow::Result<TestApp> {
    setup_with(Options::default()).await
}

pub async fn setup_with(options: Options) -> anyhow::Result<TestApp> {
    let orm = connect().await?;
    let restaurant_id = seed_restaurant(&orm, Some("acct_demo")).await?;

    let store: Arc<dyn CacheStore> = if options.failing_cache {
        Arc::new(FailingCache)
    } else {
        Arc::new(InMemoryCache::new())
    };
    let notifier = BroadcastNotifier::new(64);
    let port: Arc<dyn NotificationPort> = if options.failing_notifier {
        Arc::new(FailingNotifier)
    } else {
        Arc::new(notifier.clone())
    };
    let gateway = Arc::new(FakeGateway::new(options.failing_gateway));

    let state = AppState {
        orm,
        cache: CacheInvalidator::new(store),
        notifier: port,
        gateway: gateway.clone(),
        settings: EngineSettings {
            tax_rate_bps: TAX_RATE_BPS,
            restore_stock_on_item_cancel: options.restore_stock_on_item_cancel,
            webhook_secret: WEBHOOK_SECRET.to_string(),
            write_retry: RetryPolicy::write_conflicts().with_base_delay(Duration::from_millis(1)),
        },
    };

    Ok(TestApp {
        state,
        notifier,
        gateway,
        restaurant_id,
    })
}

/// Fresh in-memory SQLite database with every table created from the entities.
pub async fn connect() -> anyhow::Result<DatabaseConnection> {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    // One connection: every pooled connection would get its own empty database.
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let orm = Database::connect(opts).await?;

    let backend = orm.get_database_backend();
    let schema = Schema::new(backend);
    let statements = [
        schema.create_table_from_entity(restaurants::Entity),
        schema.create_table_from_entity(restaurant_tables::Entity),
        schema.create_table_from_entity(menu_items::Entity),
        schema.create_table_from_entity(table_sessions::Entity),
        schema.create_table_from_entity(orders::Entity),
        schema.create_table_from_entity(order_items::Entity),
    ];
    for statement in statements {
        orm.execute(backend.build(&statement)).await?;
    }
    Ok(orm)
}

pub async fn seed_restaurant(orm: &DatabaseConnection, account: Option<&str>) -> anyhow::Result<Uuid> {
    let restaurant = RestaurantActive {
        id: Set(Uuid::new_v4()),
        name: Set("Test Bistro".into()),
        payment_account: Set(account.map(str::to_string)),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await?;
    Ok(restaurant.id)
}

pub async fn seed_table(app: &TestApp, state: TableState) -> anyhow::Result<Uuid> {
    let table = TableActive {
        id: Set(Uuid::new_v4()),
        restaurant_id: Set(app.restaurant_id),
        label: Set("T1".into()),
        state: Set(state.as_str().to_string()),
        waiter_serving: Set(None),
        active_session_id: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(&app.state.orm)
    .await?;
    Ok(table.id)
}

pub async fn seed_food(app: &TestApp, name: &str, price: i64, stock: i32) -> anyhow::Result<Uuid> {
    let item = MenuItemActive {
        id: Set(Uuid::new_v4()),
        restaurant_id: Set(app.restaurant_id),
        name: Set(name.into()),
        category: Set(Some("mains".into())),
        price: Set(price),
        stock: Set(stock),
        is_available: Set(true),
        created_at: Set(Utc::now().into()),
    }
    .insert(&app.state.orm)
    .await?;
    Ok(item.id)
}

pub async fn stock_of(app: &TestApp, food_id: Uuid) -> anyhow::Result<i32> {
    let item = menu_items::Entity::find_by_id(food_id)
        .one(&app.state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("menu item {food_id} missing"))?;
    Ok(item.stock)
}

pub async fn table(app: &TestApp, table_id: Uuid) -> anyhow::Result<restaurant_tables::Model> {
    restaurant_tables::Entity::find_by_id(table_id)
        .one(&app.state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("table {table_id} missing"))
}

pub async fn session(app: &TestApp, session_id: Uuid) -> anyhow::Result<table_sessions::Model> {
    table_sessions::Entity::find_by_id(session_id)
        .one(&app.state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("session {session_id} missing"))
}

pub fn line(food_id: Uuid, quantity: i32) -> OrderLineRequest {
    OrderLineRequest {
        food_id,
        quantity,
        note: None,
    }
}

pub fn dine_in(app: &TestApp, table_id: Uuid, items: Vec<OrderLineRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        restaurant_id: app.restaurant_id,
        order_type: OrderType::DineIn,
        table_id: Some(table_id),
        customer_id: None,
        customer_name: None,
        waiter_id: Some(Uuid::new_v4()),
        items,
    }
}

pub fn togo(app: &TestApp, customer_name: &str, items: Vec<OrderLineRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        restaurant_id: app.restaurant_id,
        order_type: OrderType::Togo,
        table_id: None,
        customer_id: Some(Uuid::new_v4()),
        customer_name: Some(customer_name.into()),
        waiter_id: None,
        items,
    }
}

pub fn waiter() -> Actor {
    Actor {
        user_id: Uuid::new_v4(),
        role: "waiter".into(),
    }
}

/// Gateway event body for a captured payment of `order_id`.
pub fn payment_succeeded(event_id: &str, order_id: Uuid, amount: i64) -> Vec<u8> {
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": {
            "object": {
                "id": format!("pi_{event_id}"),
                "amount": amount,
                "metadata": { "order_id": order_id.to_string() }
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn sign(body: &[u8], secret: &str) -> String {
    let ts = Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(format!("{ts}.").as_bytes());
    mac.update(body);
    format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
}

/// Drains whatever the notifier has buffered so far.
pub fn drain_events(rx: &mut broadcast::Receiver<Notification>) -> Vec<OrderEventName> {
    let mut events = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        events.push(notification.event);
    }
    events
}

#[derive(Debug, Clone)]
pub struct RecordedIntent {
    pub amount: i64,
    pub destination: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Verifies webhooks like the real adapter and records intents instead of
/// calling out.
pub struct FakeGateway {
    fail: bool,
    pub intents: Mutex<Vec<RecordedIntent>>,
}

impl FakeGateway {
    pub fn new(fail: bool) -> Self {
        Self {
            fail,
            intents: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<RecordedIntent> {
        self.intents.lock().expect("intents lock").clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        amount: i64,
        destination_account: Option<&str>,
        metadata: &HashMap<String, String>,
    ) -> AppResult<PaymentIntent> {
        if self.fail {
            return Err(AppError::Gateway("gateway unavailable".into()));
        }
        let mut intents = self.intents.lock().expect("intents lock");
        intents.push(RecordedIntent {
            amount,
            destination: destination_account.map(str::to_string),
            metadata: metadata.clone(),
        });
        let n = intents.len();
        Ok(PaymentIntent {
            id: format!("pi_{n}"),
            client_secret: format!("pi_{n}_secret"),
        })
    }

    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature: &str,
        secret: &str,
    ) -> AppResult<GatewayEvent> {
        verify_signature(raw_body, signature, secret, Utc::now().timestamp())?;
        parse_event(raw_body)
    }
}

pub struct FailingCache;

#[async_trait]
impl CacheStore for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Backend("cache down".into()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Backend("cache down".into()))
    }

    async fn del(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Backend("cache down".into()))
    }

    async fn del_pattern(&self, _pattern: &str) -> Result<u64, CacheError> {
        Err(CacheError::Backend("cache down".into()))
    }
}

pub struct FailingNotifier;

#[async_trait]
impl NotificationPort for FailingNotifier {
    async fn publish(
        &self,
        _event: OrderEventName,
        _payload: serde_json::Value,
        _channels: Vec<Channel>,
    ) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("socket closed".into()))
    }
}
